//! Detection of JDK installations that the provisioner did not create.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use jrm_runtime::{JavaVersion, LocalRuntime, Platform, Vendor};

use crate::error::RegistryError;
use crate::registry::RuntimeRegistry;

/// Metadata read from a JDK's `release` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version: JavaVersion,
    pub vendor: Vendor,
    pub platform: Option<Platform>,
}

pub fn parse_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let value = value.trim().trim_matches('"').trim();
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

fn platform_from_release(os_name: Option<&String>, os_arch: Option<&String>) -> Option<Platform> {
    let os = os_name?.to_ascii_lowercase();
    let arch = os_arch?.to_ascii_lowercase();
    let os = if os.starts_with("win") {
        "windows"
    } else if os.starts_with("darwin") || os.starts_with("mac") {
        "macos"
    } else if os.starts_with("linux") {
        "linux"
    } else {
        return None;
    };
    let arch = match arch.as_str() {
        "amd64" | "x86_64" | "x64" => "x64",
        "x86" | "i386" | "i586" | "i686" => "x86",
        "aarch64" | "arm64" => "arm64",
        _ => return None,
    };
    Platform::from_slug(&format!("{os}-{arch}"))
}

/// Read `<java_home>/release`. Returns `None` when the file is missing or
/// lacks a parsable `JAVA_VERSION`.
pub fn read_release(java_home: &Path) -> Option<ReleaseInfo> {
    let content = std::fs::read_to_string(java_home.join("release")).ok()?;
    let fields = parse_release(&content);
    let version = fields
        .get("JAVA_VERSION")
        .and_then(|raw| JavaVersion::parse(raw).ok())?;
    let vendor = fields
        .get("IMPLEMENTOR")
        .map(|raw| Vendor::new(raw.as_str()))
        .filter(|vendor| !vendor.is_any())
        .unwrap_or_else(|| Vendor::new("unknown"));
    let platform = platform_from_release(fields.get("OS_NAME"), fields.get("OS_ARCH"));
    Some(ReleaseInfo {
        version,
        vendor,
        platform,
    })
}

fn has_java_binary(java_home: &Path) -> bool {
    let bin = java_home.join("bin");
    bin.join("java").is_file() || bin.join("java.exe").is_file()
}

/// Describe the JDK at `java_home` without registering it.
pub fn discover(java_home: &Path, fallback_platform: Platform) -> Option<LocalRuntime> {
    if !has_java_binary(java_home) {
        return None;
    }
    let info = read_release(java_home)?;
    Some(LocalRuntime::unmanaged(
        info.version,
        info.vendor,
        info.platform.unwrap_or(fallback_platform),
        java_home,
    ))
}

/// Register an existing JDK as an unmanaged runtime.
pub fn import_unmanaged(
    registry: &RuntimeRegistry,
    java_home: &Path,
    fallback_platform: Platform,
) -> Result<LocalRuntime, RegistryError> {
    let home = java_home
        .canonicalize()
        .unwrap_or_else(|_| java_home.to_path_buf());
    let runtime = discover(&home, fallback_platform).ok_or_else(|| {
        RegistryError::InvalidEntry(format!(
            "{} is not a JDK home (missing bin/java or release file)",
            home.display()
        ))
    })?;
    registry.insert(runtime)
}

/// Import every JDK found directly below `dir` (and `dir` itself).
/// Already registered runtimes are skipped; unreadable entries are logged.
pub fn scan(
    registry: &RuntimeRegistry,
    dir: &Path,
    fallback_platform: Platform,
) -> Result<Vec<LocalRuntime>, RegistryError> {
    let mut candidates: Vec<PathBuf> = vec![dir.to_path_buf()];
    let read_dir = std::fs::read_dir(dir).map_err(|source| RegistryError::Persist {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut children: Vec<PathBuf> = read_dir
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    children.sort();
    for child in children {
        candidates.push(child.join("Contents").join("Home"));
        candidates.push(child);
    }

    let mut imported = Vec::new();
    for candidate in candidates {
        if !candidate.is_dir() || !has_java_binary(&candidate) {
            continue;
        }
        match import_unmanaged(registry, &candidate, fallback_platform) {
            Ok(runtime) => imported.push(runtime),
            Err(RegistryError::DuplicateEntry(key)) => {
                tracing::debug!(target: "jrm::discovery", runtime = %key, "already registered");
            }
            Err(RegistryError::InvalidEntry(reason)) => {
                tracing::warn!(target: "jrm::discovery", path = %candidate.display(), %reason, "skipping");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(imported)
}
