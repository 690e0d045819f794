use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use jrm_runtime::{Platform, RuntimeKey, Vendor, VersionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("runtime already registered: {0}")]
    DuplicateEntry(RuntimeKey),
    #[error("runtime not registered: {0}")]
    NotFound(RuntimeKey),
    #[error("invalid registry entry: {0}")]
    InvalidEntry(String),
    #[error("failed to persist registry at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("registry file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure of a single download/verify/unpack/register pipeline.
///
/// Shared by every caller waiting on the same install, hence always handed
/// out behind an `Arc`.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("download of {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("download stalled for {0:?}")]
    IdleTimeout(Duration),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("unsupported archive format: {0}")]
    UnsupportedArchive(String),
    #[error("archive extraction failed: {0}")]
    Extract(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("install aborted: {0}")]
    Aborted(String),
    #[error("install directory {path} holds registered runtime {owner}")]
    DirectoryInUse { path: PathBuf, owner: RuntimeKey },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    InvalidVersionFormat(#[from] VersionError),
    #[error("no runtime matches {spec} (vendor {vendor}, platform {platform})")]
    NoMatchingRuntime {
        spec: String,
        vendor: Vendor,
        platform: Platform,
    },
    #[error("download of {0} was declined")]
    UserDeclined(RuntimeKey),
    #[error("installing {key} failed: {source}")]
    InstallFailed {
        key: RuntimeKey,
        #[source]
        source: Arc<InstallError>,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisionError::InvalidVersionFormat(_) => "invalid_version_format",
            ProvisionError::NoMatchingRuntime { .. } => "no_matching_runtime",
            ProvisionError::UserDeclined(_) => "user_declined",
            ProvisionError::InstallFailed { .. } => "install_failed",
            ProvisionError::Registry(_) => "registry",
            ProvisionError::Io(_) => "io",
        }
    }
}
