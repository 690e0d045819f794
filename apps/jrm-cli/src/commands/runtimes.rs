use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use jrm_core::{JavaVersion, RuntimeKey, Vendor};

use super::{platform_or_current, print_json, provider};

#[derive(Args)]
pub struct ListArgs {
    /// Only show runtimes for this platform (e.g. linux64, win64)
    #[arg(long)]
    pub platform: Option<String>,
    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args)]
pub struct KeyArgs {
    /// Exact version, e.g. 1.8.0_145
    pub version: String,
    /// Vendor name as registered
    #[arg(long)]
    pub vendor: String,
    /// Target platform; defaults to the host
    #[arg(long)]
    pub platform: Option<String>,
}

impl KeyArgs {
    fn key(&self) -> Result<RuntimeKey> {
        let vendor = Vendor::new(self.vendor.as_str());
        if vendor.is_any() {
            bail!("a concrete --vendor is required");
        }
        Ok(RuntimeKey::new(
            JavaVersion::parse(&self.version)?,
            vendor,
            platform_or_current(self.platform.as_deref())?,
        ))
    }
}

#[derive(Args)]
pub struct RemoveArgs {
    #[command(flatten)]
    pub key: KeyArgs,
    /// Also delete the install directory of a managed runtime
    #[arg(long)]
    pub purge: bool,
}

#[derive(Args)]
pub struct ImportArgs {
    /// JDK home directory (contains bin/java and a release file)
    pub java_home: PathBuf,
    /// Platform to record when the release file does not say
    #[arg(long)]
    pub platform: Option<String>,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Directory holding JDK installations
    pub dir: PathBuf,
    /// Platform to record when a release file does not say
    #[arg(long)]
    pub platform: Option<String>,
}

pub async fn list(args: ListArgs) -> Result<()> {
    let provider = provider(None)?;
    let filter = match args.platform.as_deref() {
        Some(slug) => Some(platform_or_current(Some(slug))?),
        None => None,
    };
    let runtimes: Vec<_> = provider
        .list()
        .into_iter()
        .filter(|rt| filter.is_none_or(|platform| rt.platform == platform))
        .collect();
    print_json(&runtimes, args.pretty)
}

pub async fn activate(args: KeyArgs) -> Result<()> {
    let provider = provider(None)?;
    let runtime = provider.activate(&args.key()?)?;
    print_json(&runtime, false)
}

pub async fn remove(args: RemoveArgs) -> Result<()> {
    let provider = provider(None)?;
    let runtime = provider.remove(&args.key.key()?, args.purge).await?;
    print_json(&runtime, false)
}

pub async fn import(args: ImportArgs) -> Result<()> {
    let provider = provider(None)?;
    let platform = platform_or_current(args.platform.as_deref())?;
    let runtime = provider.import(&args.java_home, platform)?;
    print_json(&runtime, false)
}

pub async fn scan(args: ScanArgs) -> Result<()> {
    let provider = provider(None)?;
    let platform = platform_or_current(args.platform.as_deref())?;
    let imported = provider.scan(&args.dir, platform)?;
    print_json(&imported, false)
}
