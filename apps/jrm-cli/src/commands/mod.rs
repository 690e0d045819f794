pub mod paths;
pub mod resolve;
pub mod runtimes;

pub use paths::{ConfigCmd, PathsArgs};
pub use resolve::ResolveArgs;
pub use runtimes::{ImportArgs, KeyArgs, ListArgs, RemoveArgs, ScanArgs};

use anyhow::{anyhow, Result};
use jrm_core::{Platform, ProvisionerConfig, RuntimeProvider};
use serde::Serialize;

pub(crate) fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

pub(crate) fn platform_or_current(slug: Option<&str>) -> Result<Platform> {
    match slug {
        Some(slug) => Ok(slug.parse()?),
        None => Platform::current()
            .ok_or_else(|| anyhow!("unsupported host platform; pass --platform explicitly")),
    }
}

pub(crate) fn provider(progress: Option<std::sync::Arc<dyn jrm_core::ProgressListener>>) -> Result<RuntimeProvider> {
    let config = ProvisionerConfig::load()?;
    RuntimeProvider::from_config(config, progress)
}
