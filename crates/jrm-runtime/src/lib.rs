use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

mod version;

pub use version::{JavaVersion, VersionError, VersionSpec};

/// Schema revision written into persisted registry snapshots.
pub const REGISTRY_SCHEMA: u32 = 1;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

/// Operating system and architecture pair a runtime is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    Mac64,
    MacArm64,
    Win32,
    Win64,
    Linux32,
    Linux64,
    LinuxArm64,
}

impl Platform {
    pub const ALL: [Platform; 7] = [
        Platform::Mac64,
        Platform::MacArm64,
        Platform::Win32,
        Platform::Win64,
        Platform::Linux32,
        Platform::Linux64,
        Platform::LinuxArm64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mac64 => "mac64",
            Platform::MacArm64 => "mac-arm64",
            Platform::Win32 => "win32",
            Platform::Win64 => "win64",
            Platform::Linux32 => "linux32",
            Platform::Linux64 => "linux64",
            Platform::LinuxArm64 => "linux-arm64",
        }
    }

    pub fn display_label(&self) -> &'static str {
        match self {
            Platform::Mac64 => "macOS x64",
            Platform::MacArm64 => "macOS arm64",
            Platform::Win32 => "Windows x86",
            Platform::Win64 => "Windows x64",
            Platform::Linux32 => "Linux x86",
            Platform::Linux64 => "Linux x64",
            Platform::LinuxArm64 => "Linux arm64",
        }
    }

    pub fn from_slug(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "mac64" | "mac-x64" | "macos-x64" | "macos-x86-64" | "osx-x64" => Some(Platform::Mac64),
            "mac-arm64" | "macarm64" | "macos-arm64" | "macos-aarch64" | "mac-aarch64" => {
                Some(Platform::MacArm64)
            }
            "win32" | "windows-x86" | "windows-i686" | "win-x86" => Some(Platform::Win32),
            "win64" | "windows-x64" | "windows-x86-64" | "win-x64" => Some(Platform::Win64),
            "linux32" | "linux-x86" | "linux-i686" => Some(Platform::Linux32),
            "linux64" | "linux-x64" | "linux-x86-64" => Some(Platform::Linux64),
            "linux-arm64" | "linuxarm64" | "linux-aarch64" => Some(Platform::LinuxArm64),
            _ => None,
        }
    }

    /// Platform this binary was compiled for, if it is one we provision for.
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "macos") {
            if cfg!(target_arch = "aarch64") {
                Some(Platform::MacArm64)
            } else if cfg!(target_arch = "x86_64") {
                Some(Platform::Mac64)
            } else {
                None
            }
        } else if cfg!(target_os = "windows") {
            if cfg!(target_arch = "x86_64") {
                Some(Platform::Win64)
            } else if cfg!(target_arch = "x86") {
                Some(Platform::Win32)
            } else {
                None
            }
        } else if cfg!(target_os = "linux") {
            if cfg!(target_arch = "x86_64") {
                Some(Platform::Linux64)
            } else if cfg!(target_arch = "x86") {
                Some(Platform::Linux32)
            } else if cfg!(target_arch = "aarch64") {
                Some(Platform::LinuxArm64)
            } else {
                None
            }
        } else {
            None
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Win32 | Platform::Win64)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::from_slug(s).ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Runtime vendor name. Comparison is case-insensitive.
///
/// [`ANY_VENDOR`] matches every vendor during resolution; it is never stored
/// as the vendor of an installed runtime.
#[derive(Clone, Debug)]
pub struct Vendor {
    name: Cow<'static, str>,
}

const ANY_VENDOR_NAME: &str = "*";

pub const ANY_VENDOR: Vendor = Vendor {
    name: Cow::Borrowed(ANY_VENDOR_NAME),
};

impl Vendor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed == ANY_VENDOR_NAME || trimmed.eq_ignore_ascii_case("any") {
            return ANY_VENDOR;
        }
        Self {
            name: Cow::Owned(trimmed.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_any(&self) -> bool {
        self.name == ANY_VENDOR_NAME
    }

    /// Exact (case-insensitive) or wildcard match on either side.
    pub fn matches(&self, other: &Vendor) -> bool {
        self.is_any() || other.is_any() || self.name.eq_ignore_ascii_case(&other.name)
    }

    /// Match that did not rely on the wildcard.
    pub fn is_exact_match(&self, other: &Vendor) -> bool {
        !self.is_any() && !other.is_any() && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl PartialEq for Vendor {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for Vendor {}

impl Hash for Vendor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.name.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Vendor {
    fn from(value: &str) -> Self {
        Vendor::new(value)
    }
}

impl Serialize for Vendor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for Vendor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Vendor::new)
    }
}

/// Identity of a runtime: unique within the registry and the unit of install de-duplication.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeKey {
    pub version: JavaVersion,
    pub vendor: Vendor,
    pub platform: Platform,
}

impl RuntimeKey {
    pub fn new(version: JavaVersion, vendor: Vendor, platform: Platform) -> Self {
        Self {
            version,
            vendor,
            platform,
        }
    }

    /// Filesystem-safe directory name for a managed installation.
    pub fn dir_name(&self) -> String {
        format!(
            "{}-{}-{}",
            self.vendor.name().to_ascii_lowercase(),
            self.version,
            self.platform
        )
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
    }
}

impl fmt::Display for RuntimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.vendor, self.version, self.platform)
    }
}

/// An installable runtime advertised by a remote manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRuntimeDescriptor {
    pub version: JavaVersion,
    pub vendor: Vendor,
    pub platform: Platform,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl RemoteRuntimeDescriptor {
    pub fn new(
        version: JavaVersion,
        vendor: Vendor,
        platform: Platform,
        url: impl Into<String>,
    ) -> Self {
        Self {
            version,
            vendor,
            platform,
            url: url.into(),
            sha256: None,
            size_bytes: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    pub fn key(&self) -> RuntimeKey {
        RuntimeKey::new(self.version.clone(), self.vendor.clone(), self.platform)
    }
}

/// A runtime present on this machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRuntime {
    pub version: JavaVersion,
    pub vendor: Vendor,
    pub platform: Platform,
    pub java_home: PathBuf,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub managed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
}

impl LocalRuntime {
    /// Runtime installed and owned by the provisioner.
    pub fn managed(descriptor: &RemoteRuntimeDescriptor, java_home: impl Into<PathBuf>) -> Self {
        Self {
            version: descriptor.version.clone(),
            vendor: descriptor.vendor.clone(),
            platform: descriptor.platform,
            java_home: java_home.into(),
            active: false,
            managed: true,
            installed_at: Some(Utc::now()),
        }
    }

    /// Pre-existing installation discovered on disk.
    pub fn unmanaged(
        version: JavaVersion,
        vendor: Vendor,
        platform: Platform,
        java_home: impl Into<PathBuf>,
    ) -> Self {
        Self {
            version,
            vendor,
            platform,
            java_home: java_home.into(),
            active: false,
            managed: false,
            installed_at: None,
        }
    }

    pub fn key(&self) -> RuntimeKey {
        RuntimeKey::new(self.version.clone(), self.vendor.clone(), self.platform)
    }

    pub fn java_home(&self) -> &Path {
        &self.java_home
    }

    pub fn java_binary(&self) -> PathBuf {
        let exe = if self.platform.is_windows() {
            "java.exe"
        } else {
            "java"
        };
        self.java_home.join("bin").join(exe)
    }
}

/// Durable registry document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default = "default_schema")]
    pub schema: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub runtimes: Vec<LocalRuntime>,
}

impl RegistrySnapshot {
    pub fn empty() -> Self {
        Self {
            schema: REGISTRY_SCHEMA,
            updated_at: Utc::now(),
            runtimes: Vec::new(),
        }
    }
}

fn default_schema() -> u32 {
    REGISTRY_SCHEMA
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(text: &str) -> JavaVersion {
        JavaVersion::parse(text).expect("version")
    }

    #[test]
    fn platform_slugs_accept_aliases() {
        assert_eq!(Platform::from_slug("LINUX64"), Some(Platform::Linux64));
        assert_eq!(Platform::from_slug("linux-x64"), Some(Platform::Linux64));
        assert_eq!(Platform::from_slug("windows_x64"), Some(Platform::Win64));
        assert_eq!(Platform::from_slug(" macos-aarch64 "), Some(Platform::MacArm64));
        assert_eq!(Platform::from_slug("solaris-sparc"), None);
        for platform in Platform::ALL {
            assert_eq!(Platform::from_slug(platform.as_str()), Some(platform));
        }
    }

    #[test]
    fn vendor_matching_is_case_insensitive_with_wildcard() {
        let adopt = Vendor::new("adopt");
        assert_eq!(adopt, Vendor::new("ADOPT"));
        assert!(adopt.matches(&Vendor::new("Adopt")));
        assert!(adopt.matches(&ANY_VENDOR));
        assert!(ANY_VENDOR.matches(&Vendor::new("oracle")));
        assert!(!adopt.matches(&Vendor::new("oracle")));
        assert!(adopt.is_exact_match(&Vendor::new("ADOPT")));
        assert!(!adopt.is_exact_match(&ANY_VENDOR));
        assert!(Vendor::new("any").is_any());
        assert!(Vendor::new("").is_any());
    }

    #[test]
    fn keys_hash_consistently_with_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(RuntimeKey::new(v("1.8.145"), Vendor::new("Adopt"), Platform::Linux64));
        assert!(set.contains(&RuntimeKey::new(
            v("1.8.145"),
            Vendor::new("adopt"),
            Platform::Linux64
        )));
        assert!(!set.contains(&RuntimeKey::new(
            v("1.8.145"),
            Vendor::new("adopt"),
            Platform::Win64
        )));
    }

    #[test]
    fn dir_name_is_filesystem_safe() {
        let key = RuntimeKey::new(v("11.0.2+9"), Vendor::new("Eclipse Temurin"), Platform::Win64);
        assert_eq!(key.dir_name(), "eclipse_temurin-11.0.2_9-win64");
    }

    #[test]
    fn local_runtime_reads_snapshot_json() {
        let payload = json!({
            "schema": 1,
            "updated_at": "2024-05-20T12:00:00Z",
            "runtimes": [{
                "version": "1.8.145",
                "vendor": "adopt",
                "platform": "linux64",
                "java_home": "/opt/jdk8",
                "active": true,
            }]
        });
        let snapshot: RegistrySnapshot = serde_json::from_value(payload).expect("snapshot");
        let runtime = &snapshot.runtimes[0];
        assert_eq!(runtime.platform, Platform::Linux64);
        assert!(runtime.active);
        assert!(!runtime.managed);
        assert_eq!(runtime.java_binary(), PathBuf::from("/opt/jdk8/bin/java"));
    }
}
