/// Serializes tests that mutate process environment and restores the
/// previous values when the guard drops.
pub mod env {
    use once_cell::sync::Lazy;
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    pub struct EnvGuard {
        _lock: MutexGuard<'static, ()>,
        saved: Vec<(&'static str, Option<String>)>,
    }

    pub fn guard() -> EnvGuard {
        EnvGuard {
            _lock: ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
            saved: Vec::new(),
        }
    }

    impl EnvGuard {
        fn remember(&mut self, key: &'static str) {
            if self.saved.iter().any(|(k, _)| *k == key) {
                return;
            }
            self.saved.push((key, std::env::var(key).ok()));
        }

        pub fn set(&mut self, key: &'static str, value: &str) {
            self.remember(key);
            std::env::set_var(key, value);
        }

        pub fn remove(&mut self, key: &'static str) {
            self.remember(key);
            std::env::remove_var(key);
        }

        pub fn clear_keys(&mut self, keys: &[&'static str]) {
            for &k in keys {
                self.remove(k);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, val) in self.saved.drain(..) {
                match val {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}

/// On-disk and in-memory fixtures shared by the unit tests.
pub mod fixtures {
    use std::io::Write as _;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use jrm_runtime::{
        JavaVersion, LocalRuntime, Platform, RemoteRuntimeDescriptor, Vendor,
    };

    use crate::error::ProvisionError;
    use crate::provider::ProvisionPrompt;

    pub fn version(text: &str) -> JavaVersion {
        JavaVersion::parse(text).expect("fixture version")
    }

    pub fn remote(ver: &str, vendor: &str, platform: Platform, url: &str) -> RemoteRuntimeDescriptor {
        RemoteRuntimeDescriptor::new(version(ver), Vendor::new(vendor), platform, url)
    }

    pub fn local(ver: &str, vendor: &str, platform: Platform, home: &str) -> LocalRuntime {
        LocalRuntime::unmanaged(version(ver), Vendor::new(vendor), platform, home)
    }

    /// Lay out a minimal JDK home with a `release` file and `bin/java`.
    pub fn fake_java_home(root: &Path, java_version: &str, implementor: &str) -> PathBuf {
        std::fs::create_dir_all(root.join("bin")).expect("create bin");
        std::fs::write(root.join("bin").join("java"), b"#!/bin/sh\n").expect("write java");
        std::fs::write(
            root.join("release"),
            format!("JAVA_VERSION=\"{java_version}\"\nIMPLEMENTOR=\"{implementor}\"\n"),
        )
        .expect("write release");
        root.to_path_buf()
    }

    /// Zip archive holding `<top>/bin/java` and `<top>/release`.
    pub fn jdk_zip(top: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        writer
            .start_file(format!("{top}/bin/java"), options)
            .expect("zip entry");
        writer.write_all(b"#!/bin/sh\n").expect("zip write");
        writer
            .start_file(format!("{top}/release"), options)
            .expect("zip entry");
        writer
            .write_all(b"JAVA_VERSION=\"1.8.0_145\"\n")
            .expect("zip write");
        writer.finish().expect("zip finish").into_inner()
    }

    /// Gzipped tarball holding `<top>/bin/java`.
    pub fn jdk_tar_gz(top: &str) -> Vec<u8> {
        let payload = b"#!/bin/sh\n";
        let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
            Vec::new(),
            flate2::Compression::default(),
        ));
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{top}/bin/java"), &payload[..])
            .expect("tar entry");
        builder
            .into_inner()
            .expect("tar finish")
            .finish()
            .expect("gzip finish")
    }

    /// Prompt double that answers every confirmation the same way and counts calls.
    #[derive(Default)]
    pub struct ScriptedPrompt {
        pub accept: bool,
        pub downloads_asked: AtomicUsize,
        pub updates_asked: AtomicUsize,
        pub errors_reported: AtomicUsize,
    }

    impl ScriptedPrompt {
        pub fn accepting() -> Self {
            Self {
                accept: true,
                ..Default::default()
            }
        }

        pub fn declining() -> Self {
            Self::default()
        }

        pub fn downloads(&self) -> usize {
            self.downloads_asked.load(Ordering::SeqCst)
        }

        pub fn updates(&self) -> usize {
            self.updates_asked.load(Ordering::SeqCst)
        }

        pub fn errors(&self) -> usize {
            self.errors_reported.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProvisionPrompt for ScriptedPrompt {
        async fn confirm_download(&self, _candidate: &RemoteRuntimeDescriptor) -> bool {
            self.downloads_asked.fetch_add(1, Ordering::SeqCst);
            self.accept
        }

        async fn confirm_update(
            &self,
            _current: &LocalRuntime,
            _candidate: &RemoteRuntimeDescriptor,
        ) -> bool {
            self.updates_asked.fetch_add(1, Ordering::SeqCst);
            self.accept
        }

        async fn report_error(&self, _message: &str, _cause: &ProvisionError) {
            self.errors_reported.fetch_add(1, Ordering::SeqCst);
        }
    }
}
