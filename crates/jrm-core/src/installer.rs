use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use jrm_runtime::RemoteRuntimeDescriptor;

use crate::error::InstallError;

/// Integrity check and extraction of a downloaded runtime archive.
///
/// Both calls are blocking; the coordinator runs them on the blocking pool.
pub trait RuntimeInstaller: Send + Sync {
    /// Fail unless the archive matches what the descriptor promises.
    /// `sha256_hex` is the digest computed while streaming the download.
    fn verify(
        &self,
        descriptor: &RemoteRuntimeDescriptor,
        archive: &Path,
        sha256_hex: &str,
    ) -> Result<(), InstallError>;

    /// Extract `archive` into the empty directory `dest`.
    fn unpack(
        &self,
        descriptor: &RemoteRuntimeDescriptor,
        archive: &Path,
        dest: &Path,
    ) -> Result<(), InstallError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Guess the format from the download URL, ignoring query and fragment.
    pub fn detect(url: &str) -> Option<Self> {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_ascii_lowercase();
        if path.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

/// Zip and gzipped tar archives, SHA-256 verified when the manifest declares a digest.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveInstaller;

impl RuntimeInstaller for ArchiveInstaller {
    fn verify(
        &self,
        descriptor: &RemoteRuntimeDescriptor,
        _archive: &Path,
        sha256_hex: &str,
    ) -> Result<(), InstallError> {
        match descriptor.sha256.as_deref() {
            Some(expected) if !expected.eq_ignore_ascii_case(sha256_hex) => {
                Err(InstallError::ChecksumMismatch {
                    expected: expected.to_ascii_lowercase(),
                    actual: sha256_hex.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn unpack(
        &self,
        descriptor: &RemoteRuntimeDescriptor,
        archive: &Path,
        dest: &Path,
    ) -> Result<(), InstallError> {
        let format = ArchiveFormat::detect(&descriptor.url)
            .ok_or_else(|| InstallError::UnsupportedArchive(descriptor.url.clone()))?;
        let file = File::open(archive)?;
        match format {
            ArchiveFormat::Zip => {
                let mut zip = zip::ZipArchive::new(BufReader::new(file))
                    .map_err(|err| InstallError::Extract(err.to_string()))?;
                zip.extract(dest)
                    .map_err(|err| InstallError::Extract(err.to_string()))?;
            }
            ArchiveFormat::TarGz => {
                let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
                let mut tar = tar::Archive::new(decoder);
                tar.set_preserve_permissions(true);
                tar.unpack(dest)
                    .map_err(|err| InstallError::Extract(err.to_string()))?;
            }
        }
        Ok(())
    }
}

/// Path of the JDK home relative to an unpacked archive root: the root
/// itself, its single top-level directory, or a macOS `Contents/Home` below either.
pub fn locate_java_home(root: &Path) -> Result<PathBuf, InstallError> {
    let looks_like_home = |dir: &Path| dir.join("bin").is_dir();
    let candidates = |base: PathBuf| [base.clone(), base.join("Contents").join("Home")];

    for candidate in candidates(PathBuf::new()) {
        if looks_like_home(&root.join(&candidate)) {
            return Ok(candidate);
        }
    }

    let mut dirs = std::fs::read_dir(root)?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .map(|entry| PathBuf::from(entry.file_name()));
    if let (Some(single), None) = (dirs.next(), dirs.next()) {
        for candidate in candidates(single) {
            if looks_like_home(&root.join(&candidate)) {
                return Ok(candidate);
            }
        }
    }
    Err(InstallError::Extract(
        "archive does not contain a JDK (no bin directory found)".into(),
    ))
}
