//! Download, verify, unpack and register runtimes, one transfer per key.
//!
//! Concurrent `install` calls for the same [`RuntimeKey`] share a single
//! future. The in-flight table only keeps weak handles, so the transfer is
//! dropped (and its staging directory removed) once every waiter has gone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use futures_util::StreamExt;
use jrm_runtime::{LocalRuntime, RemoteRuntimeDescriptor, RuntimeKey};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::InstallError;
use crate::installer::{locate_java_home, ArchiveFormat, ArchiveInstaller, RuntimeInstaller};
use crate::registry::{Registration, RuntimeRegistry};

const PROGRESS_EMIT_BYTES: u64 = 5 * 1024 * 1024; // 5 MiB
const PROGRESS_EMIT_INTERVAL: Duration = Duration::from_millis(750);
const STAGING_DIR: &str = ".staging";

pub type InstallOutcome = Result<LocalRuntime, Arc<InstallError>>;
type InstallFuture = BoxFuture<'static, InstallOutcome>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    Downloading,
    Verifying,
    Unpacking,
    Finished,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadProgress {
    pub key: RuntimeKey,
    pub phase: InstallPhase,
    pub downloaded: u64,
    pub total: Option<u64>,
}

impl DownloadProgress {
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => {
                Some(((self.downloaded as f64) / (total as f64) * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, progress: &DownloadProgress);
}

impl<F> ProgressListener for F
where
    F: Fn(&DownloadProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &DownloadProgress) {
        self(progress)
    }
}

#[derive(Clone)]
pub struct CoordinatorOptions {
    pub installer: Arc<dyn RuntimeInstaller>,
    /// Abort when no bytes arrive for this long.
    pub idle_timeout: Option<Duration>,
    pub progress: Option<Arc<dyn ProgressListener>>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            installer: Arc::new(ArchiveInstaller),
            idle_timeout: None,
            progress: None,
        }
    }
}

struct InflightJob {
    id: u64,
    shared: WeakShared<InstallFuture>,
    started_at: Instant,
    url: String,
}

/// Snapshot of an install that still has waiters.
#[derive(Debug, Clone, Serialize)]
pub struct InflightInstall {
    pub key: RuntimeKey,
    pub url: String,
    pub elapsed_secs: u64,
}

struct CoordinatorInner {
    registry: Arc<RuntimeRegistry>,
    install_root: PathBuf,
    client: reqwest::Client,
    options: CoordinatorOptions,
    jobs: Mutex<HashMap<RuntimeKey, InflightJob>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct DownloadCoordinator {
    inner: Arc<CoordinatorInner>,
}

/// Removes the in-flight entry when the install completes or is dropped.
struct JobSlot {
    inner: Arc<CoordinatorInner>,
    key: RuntimeKey,
    id: u64,
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        let mut jobs = self.inner.jobs.lock();
        if jobs.get(&self.key).is_some_and(|job| job.id == self.id) {
            jobs.remove(&self.key);
        }
    }
}

impl DownloadCoordinator {
    pub fn new(
        registry: Arc<RuntimeRegistry>,
        install_root: impl Into<PathBuf>,
        client: reqwest::Client,
    ) -> Self {
        Self::with_options(registry, install_root, client, CoordinatorOptions::default())
    }

    pub fn with_options(
        registry: Arc<RuntimeRegistry>,
        install_root: impl Into<PathBuf>,
        client: reqwest::Client,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                registry,
                install_root: install_root.into(),
                client,
                options,
                jobs: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn install_root(&self) -> &Path {
        &self.inner.install_root
    }

    /// Install `descriptor`, or wait for the install already running for its key.
    /// Every waiter receives the same runtime or the same error.
    pub async fn install(&self, descriptor: RemoteRuntimeDescriptor) -> InstallOutcome {
        let key = descriptor.key();
        let shared: Shared<InstallFuture> = {
            let mut jobs = self.inner.jobs.lock();
            match jobs.get(&key).and_then(|job| job.shared.upgrade()) {
                Some(existing) => {
                    tracing::debug!(target: "jrm::downloads", runtime = %key, "joining in-flight install");
                    existing
                }
                None => {
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let url = descriptor.url.clone();
                    let slot = JobSlot {
                        inner: Arc::clone(&self.inner),
                        key: key.clone(),
                        id,
                    };
                    let inner = Arc::clone(&self.inner);
                    let future: InstallFuture = async move {
                        let _slot = slot;
                        inner.run(descriptor).await
                    }
                    .boxed();
                    let shared = future.shared();
                    if let Some(weak) = shared.downgrade() {
                        jobs.insert(
                            key.clone(),
                            InflightJob {
                                id,
                                shared: weak,
                                started_at: Instant::now(),
                                url,
                            },
                        );
                    }
                    shared
                }
            }
        };
        shared.await
    }

    /// Installs that still have at least one waiter.
    pub fn in_flight(&self) -> Vec<InflightInstall> {
        // Upgraded handles must outlive the lock: dropping the last one runs
        // the job's cleanup, which takes the lock again.
        let (mut out, _alive): (Vec<InflightInstall>, Vec<Shared<InstallFuture>>) = {
            let jobs = self.inner.jobs.lock();
            jobs.iter()
                .filter_map(|(key, job)| {
                    let alive = job.shared.upgrade()?;
                    Some((
                        InflightInstall {
                            key: key.clone(),
                            url: job.url.clone(),
                            elapsed_secs: job.started_at.elapsed().as_secs(),
                        },
                        alive,
                    ))
                })
                .unzip()
        };
        out.sort_by(|a, b| a.key.to_string().cmp(&b.key.to_string()));
        out
    }
}

impl CoordinatorInner {
    async fn run(self: Arc<Self>, descriptor: RemoteRuntimeDescriptor) -> InstallOutcome {
        let key = descriptor.key();
        let started = Instant::now();
        match self.install_inner(&descriptor).await {
            Ok(runtime) => {
                tracing::info!(
                    target: "jrm::downloads",
                    runtime = %key,
                    java_home = %runtime.java_home.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "runtime installed"
                );
                Ok(runtime)
            }
            Err(err) => {
                tracing::error!(target: "jrm::downloads", runtime = %key, error = %err, "install failed");
                Err(Arc::new(err))
            }
        }
    }

    fn emit(&self, key: &RuntimeKey, phase: InstallPhase, downloaded: u64, total: Option<u64>) {
        if let Some(listener) = &self.options.progress {
            listener.on_progress(&DownloadProgress {
                key: key.clone(),
                phase,
                downloaded,
                total,
            });
        }
    }

    async fn install_inner(
        &self,
        descriptor: &RemoteRuntimeDescriptor,
    ) -> Result<LocalRuntime, InstallError> {
        let key = descriptor.key();
        if let Some(existing) = self.registry.get(&key) {
            return Ok(existing);
        }

        let staging_root = self.install_root.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging_root).await?;
        let staging = tempfile::Builder::new()
            .prefix(&format!("{}-", key.dir_name()))
            .tempdir_in(&staging_root)?;
        let extension = ArchiveFormat::detect(&descriptor.url)
            .map(|format| format.extension())
            .unwrap_or("bin");
        let archive = staging.path().join(format!("download.{extension}"));

        let (downloaded, sha256) = self.download(descriptor, &archive).await?;
        tracing::debug!(target: "jrm::downloads", runtime = %key, bytes = downloaded, %sha256, "archive downloaded");

        self.emit(&key, InstallPhase::Verifying, downloaded, descriptor.size_bytes);
        let installer = Arc::clone(&self.options.installer);
        let registry = Arc::clone(&self.registry);
        let final_dir = self.install_root.join(key.dir_name());
        let blocking_descriptor = descriptor.clone();
        let progress_key = key.clone();
        let progress = self.options.progress.clone();
        let registration = tokio::task::spawn_blocking(move || {
            let staging = staging;
            installer.verify(&blocking_descriptor, &archive, &sha256)?;
            if let Some(listener) = &progress {
                listener.on_progress(&DownloadProgress {
                    key: progress_key.clone(),
                    phase: InstallPhase::Unpacking,
                    downloaded,
                    total: blocking_descriptor.size_bytes,
                });
            }
            let unpacked = staging.path().join("unpacked");
            std::fs::create_dir_all(&unpacked)?;
            installer.unpack(&blocking_descriptor, &archive, &unpacked)?;
            let relative_home = locate_java_home(&unpacked)?;
            let java_home = if relative_home.as_os_str().is_empty() {
                final_dir.clone()
            } else {
                final_dir.join(relative_home)
            };

            let mut promoted = false;
            let outcome = registry.register_with(&progress_key, |entries| {
                promote(&unpacked, &final_dir, entries)?;
                promoted = true;
                Ok::<_, InstallError>(LocalRuntime::managed(&blocking_descriptor, java_home))
            });
            if outcome.is_err() && promoted {
                if let Err(cleanup) = std::fs::remove_dir_all(&final_dir) {
                    tracing::warn!(target: "jrm::downloads", path = %final_dir.display(), error = %cleanup, "cleanup failed");
                }
            }
            outcome
        })
        .await
        .map_err(|err| InstallError::Aborted(err.to_string()))??;

        let registered = match registration {
            Registration::Inserted(runtime) => runtime,
            Registration::Existing(runtime) => {
                tracing::debug!(target: "jrm::downloads", runtime = %key, "registered elsewhere meanwhile; discarding download");
                runtime
            }
        };
        self.emit(&key, InstallPhase::Finished, downloaded, descriptor.size_bytes);
        Ok(registered)
    }

    /// Stream the archive to `dest`, hashing as it arrives.
    async fn download(
        &self,
        descriptor: &RemoteRuntimeDescriptor,
        dest: &Path,
    ) -> Result<(u64, String), InstallError> {
        let key = descriptor.key();
        let url = descriptor.url.as_str();
        let http_err = |source| InstallError::Http {
            url: url.to_string(),
            source,
        };
        let request = self.client.get(url).send();
        let response = match self.options.idle_timeout {
            Some(idle) => tokio::time::timeout(idle, request)
                .await
                .map_err(|_| InstallError::IdleTimeout(idle))?,
            None => request.await,
        }
        .map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let total = response.content_length().or(descriptor.size_bytes);
        let mut stream = response.bytes_stream();
        let mut file = tokio::io::BufWriter::new(tokio::fs::File::create(dest).await?);
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut last_emit_bytes: u64 = 0;
        let mut last_emit_at = Instant::now();
        self.emit(&key, InstallPhase::Downloading, 0, total);

        loop {
            let next = match self.options.idle_timeout {
                Some(idle) => match tokio::time::timeout(idle, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::warn!(target: "jrm::downloads", runtime = %key, ?idle, "download idle timeout");
                        return Err(InstallError::IdleTimeout(idle));
                    }
                },
                None => stream.next().await,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(http_err)?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded = downloaded.saturating_add(chunk.len() as u64);

            if downloaded.saturating_sub(last_emit_bytes) >= PROGRESS_EMIT_BYTES
                || last_emit_at.elapsed() >= PROGRESS_EMIT_INTERVAL
            {
                self.emit(&key, InstallPhase::Downloading, downloaded, total);
                last_emit_bytes = downloaded;
                last_emit_at = Instant::now();
            }
        }

        file.flush().await?;
        file.get_mut().sync_all().await?;
        self.emit(&key, InstallPhase::Downloading, downloaded, total);
        Ok((downloaded, hex::encode(hasher.finalize())))
    }
}

/// Move the unpacked tree into place with a single rename. A leftover
/// directory at the destination is discarded unless a registered runtime
/// lives inside it. Called with the registry store locked.
fn promote(unpacked: &Path, final_dir: &Path, registered: &[LocalRuntime]) -> Result<(), InstallError> {
    if final_dir.exists() {
        if let Some(owner) = registered.iter().find(|rt| rt.java_home.starts_with(final_dir)) {
            return Err(InstallError::DirectoryInUse {
                path: final_dir.to_path_buf(),
                owner: owner.key(),
            });
        }
        tracing::warn!(target: "jrm::downloads", path = %final_dir.display(), "removing stale install directory");
        std::fs::remove_dir_all(final_dir)?;
    }
    if let Some(parent) = final_dir.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(unpacked, final_dir)?;
    Ok(())
}
