use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use jsonschema::{validator_for, Validator};
use jrm_runtime::{Vendor, VersionSpec, ANY_VENDOR};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::paths::EffectivePaths;
use crate::util::{env_bool, env_string, env_u64};

pub const DEFAULT_NETWORK_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct PathsSection {
    /// Directory holding the runtime registry (`registry.json`)
    #[serde(default)]
    pub state_dir: Option<String>,
    /// Directory receiving managed runtime installations
    #[serde(default)]
    pub cache_dir: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ProvisioningSection {
    /// Manifest endpoint queried when a request names none (e.g., <https://example.com/jvms>)
    #[serde(default)]
    pub default_endpoint: Option<String>,
    /// Version range the launcher supports, e.g. "1.8*" or "11+"
    #[serde(default)]
    pub supported_versions: Option<String>,
    /// Vendor used when a request does not name one ("*" for any)
    #[serde(default)]
    pub default_vendor: Option<String>,
    /// Permit requests to point at endpoints other than the default
    #[serde(default)]
    pub allow_non_default_endpoint: Option<bool>,
    /// Upper bound for manifest retrieval
    #[serde(default)]
    pub network_timeout_ms: Option<u64>,
    /// Abort a download when no bytes arrive for this long
    #[serde(default)]
    pub download_idle_timeout_ms: Option<u64>,
}

/// On-disk configuration file layout (TOML).
#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub provisioning: ProvisioningSection,
}

static CONFIG_SCHEMA: Lazy<Result<Validator, String>> = Lazy::new(|| {
    let schema_value =
        serde_json::to_value(schemars::schema_for!(Config)).map_err(|err| err.to_string())?;
    validator_for(&schema_value).map_err(|err| err.to_string())
});

/// Returns the JSON schema describing the configuration structure.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).unwrap_or_default()
}

pub fn write_schema_file(path: &Path) -> std::io::Result<()> {
    let schema_json = config_schema_json();
    std::fs::write(path, serde_json::to_string_pretty(&schema_json)?)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&content).with_context(|| format!("parsing config {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    let raw: toml::Value = toml::from_str(content)?;
    let json_value = serde_json::to_value(&raw)?;
    let validator = CONFIG_SCHEMA
        .as_ref()
        .map_err(|err| anyhow::anyhow!("config schema unavailable: {err}"))?;
    let validation_errors: Vec<_> = validator
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(anyhow::anyhow!(validation_errors.join(", ")));
    }
    let cfg: Config = toml::from_str(content)?;
    Ok(cfg)
}

/// Effective settings handed to the provider. Read once, never mutated by the engine.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub default_endpoint: Option<String>,
    pub supported_versions: VersionSpec,
    pub default_vendor: Vendor,
    pub allow_non_default_endpoint: bool,
    pub network_timeout: Duration,
    pub download_idle_timeout: Option<Duration>,
    pub state_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl ProvisionerConfig {
    /// Defaults rooted at explicit directories; no endpoint configured.
    pub fn with_dirs(state_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_endpoint: None,
            supported_versions: VersionSpec::Any,
            default_vendor: ANY_VENDOR,
            allow_non_default_endpoint: false,
            network_timeout: Duration::from_millis(DEFAULT_NETWORK_TIMEOUT_MS),
            download_idle_timeout: None,
            state_dir: state_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Overlay environment variables on a parsed config file.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let paths = EffectivePaths::resolve(Some(&cfg.paths));
        let section = &cfg.provisioning;

        let supported_versions = match env_string("JRM_SUPPORTED_VERSIONS")
            .or_else(|| section.supported_versions.clone())
        {
            Some(raw) => VersionSpec::parse(&raw)
                .with_context(|| format!("supported_versions {raw:?}"))?,
            None => VersionSpec::Any,
        };
        let default_vendor = env_string("JRM_DEFAULT_VENDOR")
            .or_else(|| section.default_vendor.clone())
            .map(Vendor::new)
            .unwrap_or(ANY_VENDOR);
        let network_timeout_ms = env_u64("JRM_NETWORK_TIMEOUT_MS")
            .or(section.network_timeout_ms)
            .unwrap_or(DEFAULT_NETWORK_TIMEOUT_MS)
            .max(1);

        Ok(Self {
            default_endpoint: env_string("JRM_ENDPOINT").or_else(|| section.default_endpoint.clone()),
            supported_versions,
            default_vendor,
            allow_non_default_endpoint: env_bool("JRM_ALLOW_NON_DEFAULT_ENDPOINT")
                .or(section.allow_non_default_endpoint)
                .unwrap_or(false),
            network_timeout: Duration::from_millis(network_timeout_ms),
            download_idle_timeout: env_u64("JRM_DOWNLOAD_IDLE_TIMEOUT_MS")
                .or(section.download_idle_timeout_ms)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            state_dir: paths.state_dir,
            cache_dir: paths.cache_dir,
        })
    }

    /// Load `JRM_CONFIG` (or `config.toml` found via [`crate::paths::resolve_config_path`])
    /// and overlay the environment. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = env_string("JRM_CONFIG")
            .map(PathBuf::from)
            .or_else(|| crate::paths::resolve_config_path("config.toml"));
        let cfg = match path {
            Some(path) => {
                let cfg = load_config(&path)?;
                tracing::debug!(target: "jrm::config", path = %path.display(), "loaded config");
                cfg
            }
            None => Config::default(),
        };
        Self::from_config(&cfg)
    }

    pub fn paths(&self) -> EffectivePaths {
        EffectivePaths {
            state_dir: self.state_dir.clone(),
            cache_dir: self.cache_dir.clone(),
        }
    }

    /// Root directory for managed installations.
    pub fn install_root(&self) -> PathBuf {
        self.paths().install_root()
    }
}
