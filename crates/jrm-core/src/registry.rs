//! Durable record of locally available runtimes.
//!
//! The registry lives in `<state_dir>/registry.json`. Every mutation takes the
//! in-process write lock and an advisory lock on `registry.lock`, re-reads the
//! file, applies the change and replaces the file atomically, so concurrent
//! launcher processes never lose each other's updates.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use jrm_runtime::{LocalRuntime, Platform, RegistrySnapshot, RuntimeKey, Vendor};
use parking_lot::RwLock;
use tempfile::NamedTempFile;

use crate::error::RegistryError;

pub const REGISTRY_FILE: &str = "registry.json";
const LOCK_FILE: &str = "registry.lock";

#[derive(Debug)]
struct RegistryStore {
    dir: PathBuf,
}

impl RegistryStore {
    fn file(&self) -> PathBuf {
        self.dir.join(REGISTRY_FILE)
    }

    /// Advisory lock on `registry.lock`; shared for reads, exclusive for writes.
    fn lock(&self, exclusive: bool) -> Result<File, RegistryError> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| RegistryError::Persist {
                path: path.clone(),
                source,
            })?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|source| RegistryError::Persist { path, source })?;
        Ok(file)
    }

    fn load(&self) -> Result<Vec<LocalRuntime>, RegistryError> {
        let path = self.file();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(RegistryError::Persist { path, source }),
        };
        let snapshot: RegistrySnapshot = serde_json::from_slice(&bytes)
            .map_err(|source| RegistryError::Corrupt { path, source })?;
        Ok(snapshot.runtimes)
    }

    fn save(&self, runtimes: &[LocalRuntime]) -> Result<(), RegistryError> {
        let path = self.file();
        let persist_err = |source: std::io::Error| RegistryError::Persist {
            path: path.clone(),
            source,
        };
        let snapshot = RegistrySnapshot {
            updated_at: Utc::now(),
            runtimes: runtimes.to_vec(),
            ..RegistrySnapshot::empty()
        };
        let body = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| persist_err(std::io::Error::other(err)))?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(persist_err)?;
        tmp.write_all(&body).map_err(persist_err)?;
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(&path).map_err(|err| persist_err(err.error))?;
        Ok(())
    }
}

/// Outcome of [`RuntimeRegistry::register_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Inserted(LocalRuntime),
    Existing(LocalRuntime),
}

impl Registration {
    pub fn into_runtime(self) -> LocalRuntime {
        match self {
            Registration::Inserted(runtime) | Registration::Existing(runtime) => runtime,
        }
    }
}

/// Thread-safe registry of local runtimes, optionally backed by a JSON file.
#[derive(Debug)]
pub struct RuntimeRegistry {
    entries: RwLock<Vec<LocalRuntime>>,
    store: Option<RegistryStore>,
}

impl RuntimeRegistry {
    /// Registry that lives only for the lifetime of the process.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            store: None,
        }
    }

    /// Open (or create) the registry under `state_dir`.
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = state_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| RegistryError::Persist {
            path: dir.clone(),
            source,
        })?;
        let store = RegistryStore { dir };
        let entries = {
            let _lock = store.lock(false)?;
            store.load()?
        };
        tracing::debug!(
            target: "jrm::registry",
            path = %store.file().display(),
            runtimes = entries.len(),
            "registry opened"
        );
        Ok(Self {
            entries: RwLock::new(entries),
            store: Some(store),
        })
    }

    /// Refresh the in-memory view from disk, picking up other processes' writes.
    pub fn reload(&self) -> Result<(), RegistryError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let mut guard = self.entries.write();
        let _lock = store.lock(false)?;
        *guard = store.load()?;
        Ok(())
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.store.as_ref().map(RegistryStore::file)
    }

    /// Runtimes matching `predicate`. Entries whose vendor exactly matches
    /// `vendor_preference` come first, then newer versions before older.
    pub fn find_all<F>(&self, vendor_preference: &Vendor, predicate: F) -> Vec<LocalRuntime>
    where
        F: Fn(&LocalRuntime) -> bool,
    {
        let mut found: Vec<LocalRuntime> = self
            .entries
            .read()
            .iter()
            .filter(|rt| predicate(rt))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            let a_exact = vendor_preference.is_exact_match(&a.vendor);
            let b_exact = vendor_preference.is_exact_match(&b.vendor);
            b_exact
                .cmp(&a_exact)
                .then_with(|| b.version.cmp(&a.version))
        });
        found
    }

    pub fn get(&self, key: &RuntimeKey) -> Option<LocalRuntime> {
        self.entries.read().iter().find(|rt| &rt.key() == key).cloned()
    }

    pub fn contains(&self, key: &RuntimeKey) -> bool {
        self.get(key).is_some()
    }

    /// Active runtime for a platform, if one has been selected.
    pub fn active(&self, platform: Platform) -> Option<LocalRuntime> {
        self.entries
            .read()
            .iter()
            .find(|rt| rt.platform == platform && rt.active)
            .cloned()
    }

    pub fn list(&self) -> Vec<LocalRuntime> {
        self.entries.read().clone()
    }

    /// Add a runtime. Fails when its key is already registered or its vendor
    /// is the wildcard.
    pub fn insert(&self, runtime: LocalRuntime) -> Result<LocalRuntime, RegistryError> {
        if runtime.vendor.is_any() {
            return Err(RegistryError::InvalidEntry(format!(
                "runtime at {} has no concrete vendor",
                runtime.java_home.display()
            )));
        }
        let key = runtime.key();
        let inserted = self.mutate(|entries| {
            if entries.iter().any(|rt| rt.key() == key) {
                return Err(RegistryError::DuplicateEntry(key.clone()));
            }
            if runtime.active {
                for other in entries.iter_mut().filter(|rt| rt.platform == runtime.platform) {
                    other.active = false;
                }
            }
            entries.push(runtime.clone());
            Ok(runtime)
        })?;
        tracing::info!(target: "jrm::registry", runtime = %key, "runtime registered");
        Ok(inserted)
    }

    /// Register the runtime produced by `build` unless `key` is already on
    /// disk. `build` runs under the exclusive store lock and sees the freshly
    /// loaded entries, so no other handle can register `key` or write its
    /// install directory meanwhile. An existing entry is returned untouched.
    pub fn register_with<E, F>(&self, key: &RuntimeKey, build: F) -> Result<Registration, E>
    where
        E: From<RegistryError>,
        F: FnOnce(&[LocalRuntime]) -> Result<LocalRuntime, E>,
    {
        let mut guard = self.entries.write();
        let _lock = match &self.store {
            Some(store) => Some(store.lock(true)?),
            None => None,
        };
        let mut working = match &self.store {
            Some(store) => store.load()?,
            None => guard.clone(),
        };
        if let Some(existing) = working.iter().find(|rt| &rt.key() == key).cloned() {
            *guard = working;
            return Ok(Registration::Existing(existing));
        }

        let runtime = build(&working)?;
        if &runtime.key() != key || runtime.vendor.is_any() {
            return Err(RegistryError::InvalidEntry(format!(
                "built runtime {} does not match {key}",
                runtime.key()
            ))
            .into());
        }
        if runtime.active {
            for other in working.iter_mut().filter(|rt| rt.platform == runtime.platform) {
                other.active = false;
            }
        }
        working.push(runtime.clone());
        if let Some(store) = &self.store {
            store.save(&working)?;
        }
        *guard = working;
        tracing::info!(target: "jrm::registry", runtime = %key, "runtime registered");
        Ok(Registration::Inserted(runtime))
    }

    /// Mark `key` active and clear the flag on every other runtime of the same
    /// platform. Idempotent.
    pub fn set_active(&self, key: &RuntimeKey) -> Result<LocalRuntime, RegistryError> {
        let updated = self.mutate(|entries| {
            if !entries.iter().any(|rt| &rt.key() == key) {
                return Err(RegistryError::NotFound(key.clone()));
            }
            let mut selected = None;
            for rt in entries.iter_mut().filter(|rt| rt.platform == key.platform) {
                rt.active = &rt.key() == key;
                if rt.active {
                    selected = Some(rt.clone());
                }
            }
            selected.ok_or_else(|| RegistryError::NotFound(key.clone()))
        })?;
        tracing::info!(target: "jrm::registry", runtime = %key, "runtime activated");
        Ok(updated)
    }

    pub fn remove(&self, key: &RuntimeKey) -> Result<LocalRuntime, RegistryError> {
        let removed = self.mutate(|entries| {
            let idx = entries
                .iter()
                .position(|rt| &rt.key() == key)
                .ok_or_else(|| RegistryError::NotFound(key.clone()))?;
            Ok(entries.remove(idx))
        })?;
        tracing::info!(target: "jrm::registry", runtime = %key, "runtime removed");
        Ok(removed)
    }

    /// Apply `change` to a fresh copy of the entries and commit it to disk and
    /// memory together. A failed change leaves both untouched.
    fn mutate<T, F>(&self, change: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&mut Vec<LocalRuntime>) -> Result<T, RegistryError>,
    {
        let mut guard = self.entries.write();
        match &self.store {
            None => {
                let mut working = guard.clone();
                let out = change(&mut working)?;
                *guard = working;
                Ok(out)
            }
            Some(store) => {
                let _lock = store.lock(true)?;
                let mut working = store.load()?;
                let out = change(&mut working)?;
                store.save(&working)?;
                *guard = working;
                Ok(out)
            }
        }
    }
}
