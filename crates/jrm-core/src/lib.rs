//! Java runtime provisioning: resolve a version request to a local JDK,
//! downloading and installing one on demand.

pub mod config;
pub mod discovery;
pub mod downloads;
pub mod error;
pub mod http_client;
pub mod installer;
pub mod manifest;
pub mod matcher;
pub mod paths;
pub mod provider;
pub mod registry;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{config_schema_json, load_config, Config, ProvisionerConfig};
pub use downloads::{
    CoordinatorOptions, DownloadCoordinator, DownloadProgress, InflightInstall, InstallPhase,
    ProgressListener,
};
pub use error::{InstallError, ProvisionError, RegistryError};
pub use installer::{ArchiveInstaller, RuntimeInstaller};
pub use manifest::{HttpManifestClient, ManifestSource, StaticManifest};
pub use matcher::{select, MatchCriteria, Selection};
pub use paths::EffectivePaths;
pub use provider::{ProvisionPrompt, ProvisionRequest, RuntimeProvider};
pub use registry::{Registration, RuntimeRegistry};

pub use jrm_runtime::{
    JavaVersion, LocalRuntime, Platform, RemoteRuntimeDescriptor, RuntimeKey, Vendor, VersionSpec,
    ANY_VENDOR,
};
