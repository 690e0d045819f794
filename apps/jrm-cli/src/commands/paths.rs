use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use jrm_core::{config, ProvisionerConfig};
use serde_json::json;

use super::print_json;

#[derive(Args)]
pub struct PathsArgs {
    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Print the effective configuration (JSON)
    Show {
        #[arg(long)]
        pretty: bool,
    },
    /// Print or write the configuration JSON schema
    Schema {
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub fn run(args: PathsArgs) -> Result<()> {
    let paths = ProvisionerConfig::load()?.paths();
    let v = json!({
        "state_dir": paths.state_dir,
        "cache_dir": paths.cache_dir,
        "install_root": paths.install_root(),
        "registry": paths.registry_file(),
    });
    print_json(&v, args.pretty)
}

pub fn run_config(cmd: ConfigCmd) -> Result<()> {
    match cmd {
        ConfigCmd::Show { pretty } => {
            let cfg = ProvisionerConfig::load()?;
            let v = json!({
                "default_endpoint": cfg.default_endpoint,
                "supported_versions": cfg.supported_versions.to_string(),
                "default_vendor": cfg.default_vendor.name(),
                "allow_non_default_endpoint": cfg.allow_non_default_endpoint,
                "network_timeout_ms": cfg.network_timeout.as_millis() as u64,
                "download_idle_timeout_ms": cfg.download_idle_timeout.map(|d| d.as_millis() as u64),
                "state_dir": cfg.state_dir,
                "cache_dir": cfg.cache_dir,
            });
            print_json(&v, pretty)
        }
        ConfigCmd::Schema { out: Some(path) } => {
            config::write_schema_file(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        ConfigCmd::Schema { out: None } => print_json(&config::config_schema_json(), true),
    }
}
