//! End-to-end resolution of a runtime request.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use jrm_runtime::{
    LocalRuntime, Platform, RemoteRuntimeDescriptor, RuntimeKey, Vendor, VersionError, VersionSpec,
};
use tokio::task::JoinHandle;

use crate::config::ProvisionerConfig;
use crate::discovery;
use crate::downloads::{CoordinatorOptions, DownloadCoordinator, ProgressListener};
use crate::error::ProvisionError;
use crate::manifest::{HttpManifestClient, ManifestSource};
use crate::matcher::{best_local, select, MatchCriteria, Selection};
use crate::registry::RuntimeRegistry;

/// Human decisions requested during resolution.
///
/// Implementations must not panic. There is no timeout: a resolution may wait
/// on a confirmation for as long as the user takes.
#[async_trait]
pub trait ProvisionPrompt: Send + Sync {
    async fn confirm_download(&self, candidate: &RemoteRuntimeDescriptor) -> bool;

    async fn confirm_update(
        &self,
        current: &LocalRuntime,
        candidate: &RemoteRuntimeDescriptor,
    ) -> bool;

    async fn report_error(&self, message: &str, cause: &ProvisionError);
}

/// What the caller wants: acceptable versions, vendor, platform and where to look.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Primary spec followed by acceptable alternatives.
    pub versions: Vec<VersionSpec>,
    /// `None` falls back to the configured default vendor.
    pub vendor: Option<Vendor>,
    pub platform: Platform,
    /// `None` falls back to the configured default endpoint.
    pub endpoint: Option<String>,
    /// Consult the manifest even when a local runtime satisfies the request.
    pub check_for_updates: bool,
}

impl ProvisionRequest {
    pub fn new(version: VersionSpec, platform: Platform) -> Self {
        Self {
            versions: vec![version],
            vendor: None,
            platform,
            endpoint: None,
            check_for_updates: false,
        }
    }

    /// Parse a whitespace separated list of specs, e.g. `"11+ 1.8*"`.
    pub fn parse(versions: &str, platform: Platform) -> Result<Self, ProvisionError> {
        let specs = versions
            .split_whitespace()
            .map(VersionSpec::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if specs.is_empty() {
            return Err(VersionError::InvalidFormat {
                input: versions.to_string(),
                reason: "version spec is empty",
            }
            .into());
        }
        Ok(Self {
            versions: specs,
            ..Self::new(VersionSpec::Any, platform)
        })
    }

    pub fn vendor(mut self, vendor: impl Into<Vendor>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn check_for_updates(mut self, check: bool) -> Self {
        self.check_for_updates = check;
        self
    }

    fn spec_label(&self) -> String {
        self.versions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub struct RuntimeProvider {
    config: ProvisionerConfig,
    registry: Arc<RuntimeRegistry>,
    manifest: Arc<dyn ManifestSource>,
    coordinator: DownloadCoordinator,
    executor: tokio::runtime::Handle,
}

impl RuntimeProvider {
    pub fn new(
        config: ProvisionerConfig,
        registry: Arc<RuntimeRegistry>,
        manifest: Arc<dyn ManifestSource>,
        coordinator: DownloadCoordinator,
        executor: tokio::runtime::Handle,
    ) -> Self {
        Self {
            config,
            registry,
            manifest,
            coordinator,
            executor,
        }
    }

    /// Wire the default registry, HTTP manifest client and coordinator from
    /// `config`. Must be called within a tokio runtime.
    pub fn from_config(
        config: ProvisionerConfig,
        progress: Option<Arc<dyn ProgressListener>>,
    ) -> anyhow::Result<Self> {
        let executor =
            tokio::runtime::Handle::try_current().context("runtime provider needs a tokio runtime")?;
        let registry = Arc::new(
            RuntimeRegistry::open(&config.state_dir)
                .with_context(|| format!("opening registry in {}", config.state_dir.display()))?,
        );
        let client = crate::http_client::client().context("building http client")?;
        let coordinator = DownloadCoordinator::with_options(
            Arc::clone(&registry),
            config.install_root(),
            client.clone(),
            CoordinatorOptions {
                idle_timeout: config.download_idle_timeout,
                progress,
                ..CoordinatorOptions::default()
            },
        );
        let manifest: Arc<dyn ManifestSource> = Arc::new(HttpManifestClient::new(client));
        Ok(Self::new(config, registry, manifest, coordinator, executor))
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RuntimeRegistry> {
        &self.registry
    }

    pub fn coordinator(&self) -> &DownloadCoordinator {
        &self.coordinator
    }

    /// Endpoint a request will query. A non-default endpoint is replaced by
    /// the default unless the configuration allows it.
    pub fn effective_endpoint(&self, requested: Option<&str>) -> Option<String> {
        let requested = requested.map(str::trim).filter(|s| !s.is_empty());
        let default = self.config.default_endpoint.as_deref();
        match (requested, default) {
            (None, default) => default.map(str::to_string),
            (Some(requested), None) => Some(requested.to_string()),
            (Some(requested), Some(default))
                if self.config.allow_non_default_endpoint
                    || requested.trim_end_matches('/') == default.trim_end_matches('/') =>
            {
                Some(requested.to_string())
            }
            (Some(requested), Some(default)) => {
                tracing::warn!(
                    target: "jrm::provider",
                    %requested,
                    %default,
                    "non-default endpoint not allowed; using default"
                );
                Some(default.to_string())
            }
        }
    }

    fn criteria(&self, request: &ProvisionRequest) -> MatchCriteria {
        MatchCriteria {
            versions: request.versions.clone(),
            vendor: request
                .vendor
                .clone()
                .unwrap_or_else(|| self.config.default_vendor.clone()),
            platform: request.platform,
            supported: self.config.supported_versions.clone(),
            check_for_updates: request.check_for_updates,
        }
    }

    /// Resolve `request` to a local runtime, downloading one if needed and
    /// confirmed. Declines, misses and install failures are also reported
    /// through `prompt`.
    pub async fn resolve(
        &self,
        request: ProvisionRequest,
        prompt: &dyn ProvisionPrompt,
    ) -> Result<LocalRuntime, ProvisionError> {
        let outcome = self.resolve_inner(&request, prompt).await;
        match &outcome {
            Ok(runtime) => {
                tracing::info!(
                    target: "jrm::provider",
                    runtime = %runtime.key(),
                    java_home = %runtime.java_home.display(),
                    "runtime resolved"
                );
            }
            Err(err) => {
                tracing::warn!(target: "jrm::provider", kind = err.kind(), error = %err, "resolution failed");
                if matches!(
                    err,
                    ProvisionError::UserDeclined(_)
                        | ProvisionError::NoMatchingRuntime { .. }
                        | ProvisionError::InstallFailed { .. }
                ) {
                    prompt.report_error(&err.to_string(), err).await;
                }
            }
        }
        outcome
    }

    async fn resolve_inner(
        &self,
        request: &ProvisionRequest,
        prompt: &dyn ProvisionPrompt,
    ) -> Result<LocalRuntime, ProvisionError> {
        let criteria = self.criteria(request);
        let platform = criteria.platform;
        let locals = self
            .registry
            .find_all(&criteria.vendor, |rt| rt.platform == platform);

        if !criteria.check_for_updates {
            if let Some(runtime) = best_local(&criteria, &locals) {
                tracing::debug!(target: "jrm::provider", runtime = %runtime.key(), "local match, skipping manifest");
                return Ok(runtime.clone());
            }
        }

        let remote = match self.effective_endpoint(request.endpoint.as_deref()) {
            Some(endpoint) => {
                self.manifest
                    .fetch(&endpoint, self.config.network_timeout)
                    .await
            }
            None => {
                tracing::debug!(target: "jrm::provider", "no manifest endpoint configured");
                Vec::new()
            }
        };

        match select(&criteria, &locals, &remote) {
            Selection::UseLocal(runtime) => Ok(runtime),
            Selection::NoMatch => Err(ProvisionError::NoMatchingRuntime {
                spec: request.spec_label(),
                vendor: criteria.vendor,
                platform,
            }),
            Selection::DownloadRemote {
                candidate,
                supersedes,
            } => {
                let key = candidate.key();
                let accepted = match &supersedes {
                    Some(current) => prompt.confirm_update(current, &candidate).await,
                    None => prompt.confirm_download(&candidate).await,
                };
                if !accepted {
                    return Err(ProvisionError::UserDeclined(key));
                }
                let installed = self
                    .coordinator
                    .install(candidate)
                    .await
                    .map_err(|source| ProvisionError::InstallFailed {
                        key: key.clone(),
                        source,
                    })?;
                match supersedes {
                    Some(previous)
                        if previous.active && previous.vendor.is_exact_match(&installed.vendor) =>
                    {
                        tracing::info!(
                            target: "jrm::provider",
                            previous = %previous.key(),
                            current = %key,
                            "update replaces active runtime"
                        );
                        let registry = Arc::clone(&self.registry);
                        let activated = tokio::task::spawn_blocking(move || registry.set_active(&key))
                            .await
                            .map_err(std::io::Error::other)??;
                        Ok(activated)
                    }
                    _ => Ok(installed),
                }
            }
        }
    }

    /// Run [`Self::resolve`] on the provider's executor so the caller's
    /// thread is never blocked.
    pub fn resolve_in_background(
        self: &Arc<Self>,
        request: ProvisionRequest,
        prompt: Arc<dyn ProvisionPrompt>,
    ) -> JoinHandle<Result<LocalRuntime, ProvisionError>> {
        let provider = Arc::clone(self);
        self.executor
            .spawn(async move { provider.resolve(request, prompt.as_ref()).await })
    }

    pub fn list(&self) -> Vec<LocalRuntime> {
        self.registry.list()
    }

    pub fn activate(&self, key: &RuntimeKey) -> Result<LocalRuntime, ProvisionError> {
        Ok(self.registry.set_active(key)?)
    }

    /// Drop a runtime from the registry. With `purge`, a managed runtime's
    /// install directory is deleted as well; unmanaged homes are never touched.
    pub async fn remove(&self, key: &RuntimeKey, purge: bool) -> Result<LocalRuntime, ProvisionError> {
        let registry = Arc::clone(&self.registry);
        let owned_key = key.clone();
        let removed = tokio::task::spawn_blocking(move || registry.remove(&owned_key))
            .await
            .map_err(std::io::Error::other)??;
        if purge && removed.managed {
            let dir = self.coordinator.install_root().join(key.dir_name());
            if removed.java_home.starts_with(&dir) {
                match tokio::fs::remove_dir_all(&dir).await {
                    Ok(()) => {
                        tracing::info!(target: "jrm::provider", path = %dir.display(), "install directory purged")
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(removed)
    }

    /// Register an existing JDK home as an unmanaged runtime.
    pub fn import(&self, java_home: &Path, platform: Platform) -> Result<LocalRuntime, ProvisionError> {
        Ok(discovery::import_unmanaged(&self.registry, java_home, platform)?)
    }

    pub fn scan(&self, dir: &Path, platform: Platform) -> Result<Vec<LocalRuntime>, ProvisionError> {
        Ok(discovery::scan(&self.registry, dir, platform)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::StaticManifest;
    use crate::test_support::fixtures::{jdk_zip, local, remote, ScriptedPrompt};
    use httpmock::prelude::*;
    use jrm_runtime::ANY_VENDOR;

    struct Harness {
        _dir: tempfile::TempDir,
        provider: Arc<RuntimeProvider>,
    }

    fn harness(config_edit: impl FnOnce(&mut ProvisionerConfig), manifest: Arc<dyn ManifestSource>) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = ProvisionerConfig::with_dirs(dir.path().join("state"), dir.path().join("cache"));
        config.default_endpoint = Some("https://jvms.example.com/jvms".into());
        config_edit(&mut config);
        let registry = Arc::new(RuntimeRegistry::open(&config.state_dir).expect("registry"));
        let coordinator = DownloadCoordinator::new(
            Arc::clone(&registry),
            config.install_root(),
            crate::http_client::client().expect("client"),
        );
        let provider = RuntimeProvider::new(
            config,
            registry,
            manifest,
            coordinator,
            tokio::runtime::Handle::current(),
        );
        Harness {
            _dir: dir,
            provider: Arc::new(provider),
        }
    }

    fn request(spec: &str) -> ProvisionRequest {
        ProvisionRequest::parse(spec, Platform::Linux64).expect("request")
    }

    #[test]
    fn request_parsing() {
        let req = request("11+ 1.8*").vendor("adopt").check_for_updates(true);
        assert_eq!(req.versions.len(), 2);
        assert_eq!(req.vendor, Some(Vendor::new("adopt")));
        assert!(req.check_for_updates);
        assert!(matches!(
            ProvisionRequest::parse("1.8*.x", Platform::Linux64),
            Err(ProvisionError::InvalidVersionFormat(_))
        ));
        assert!(matches!(
            ProvisionRequest::parse("  ", Platform::Linux64),
            Err(ProvisionError::InvalidVersionFormat(_))
        ));
    }

    #[tokio::test]
    async fn endpoint_policy() {
        let h = harness(|_| {}, Arc::new(StaticManifest::default()));
        let p = &h.provider;
        assert_eq!(
            p.effective_endpoint(None).as_deref(),
            Some("https://jvms.example.com/jvms")
        );
        assert_eq!(
            p.effective_endpoint(Some("https://evil.example.com/jvms")).as_deref(),
            Some("https://jvms.example.com/jvms")
        );
        assert_eq!(
            p.effective_endpoint(Some("https://jvms.example.com/jvms/")).as_deref(),
            Some("https://jvms.example.com/jvms/")
        );

        let open = harness(
            |cfg| cfg.allow_non_default_endpoint = true,
            Arc::new(StaticManifest::default()),
        );
        assert_eq!(
            open.provider
                .effective_endpoint(Some("http://mirror.local/jvms"))
                .as_deref(),
            Some("http://mirror.local/jvms")
        );
    }

    #[tokio::test]
    async fn local_match_skips_manifest_and_prompt() {
        let manifest = Arc::new(StaticManifest(vec![remote(
            "1.8.220",
            "adopt",
            Platform::Linux64,
            "https://dl/8u220.zip",
        )]));
        let h = harness(|_| {}, manifest);
        let installed = local("1.8.145", "adopt", Platform::Linux64, "/opt/jdk8");
        h.provider.registry().insert(installed.clone()).expect("insert");

        let prompt = ScriptedPrompt::accepting();
        let resolved = h
            .provider
            .resolve(request("1.8*").vendor("adopt"), &prompt)
            .await
            .expect("resolved");
        assert_eq!(resolved, installed);
        assert_eq!(prompt.downloads() + prompt.updates(), 0);
    }

    #[tokio::test]
    async fn declined_download_leaves_registry_untouched() {
        let manifest = Arc::new(StaticManifest(vec![remote(
            "1.8.145",
            "adopt",
            Platform::Linux64,
            "https://dl/8u145.zip",
        )]));
        let h = harness(|_| {}, manifest);
        let prompt = ScriptedPrompt::declining();
        let err = h
            .provider
            .resolve(request("1.8*").vendor(ANY_VENDOR), &prompt)
            .await
            .expect_err("declined");
        assert!(matches!(err, ProvisionError::UserDeclined(_)));
        assert_eq!(prompt.downloads(), 1);
        assert_eq!(prompt.errors(), 1);
        assert!(h.provider.list().is_empty());
    }

    #[tokio::test]
    async fn no_match_is_reported() {
        let h = harness(|_| {}, Arc::new(StaticManifest::default()));
        let prompt = ScriptedPrompt::accepting();
        let err = h
            .provider
            .resolve(request("17*"), &prompt)
            .await
            .expect_err("nothing");
        assert!(matches!(err, ProvisionError::NoMatchingRuntime { .. }));
        assert_eq!(prompt.errors(), 1);
    }

    #[tokio::test]
    async fn update_replaces_active_runtime() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/8u220.zip");
            then.status(200).body(jdk_zip("jdk8u220"));
        });
        let manifest = Arc::new(StaticManifest(vec![remote(
            "1.8.220",
            "adopt",
            Platform::Linux64,
            &server.url("/8u220.zip"),
        )]));
        let h = harness(|_| {}, manifest);
        let old = local("1.8.145", "adopt", Platform::Linux64, "/opt/jdk8");
        h.provider.registry().insert(old.clone()).expect("insert");
        h.provider.activate(&old.key()).expect("activate");

        let prompt = ScriptedPrompt::accepting();
        let updated = h
            .provider
            .resolve(request("1.8*").vendor("adopt").check_for_updates(true), &prompt)
            .await
            .expect("updated");
        assert_eq!(prompt.updates(), 1);
        assert_eq!(updated.version.to_string(), "1.8.220");
        assert!(updated.active && updated.managed);

        let old_entry = h.provider.registry().get(&old.key()).expect("old entry kept");
        assert!(!old_entry.active);
        assert_eq!(old_entry.java_home, old.java_home);
    }

    #[tokio::test]
    async fn update_from_other_vendor_keeps_previous_active() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/zulu8.zip");
            then.status(200).body(jdk_zip("zulu8"));
        });
        let manifest = Arc::new(StaticManifest(vec![remote(
            "1.8.220",
            "zulu",
            Platform::Linux64,
            &server.url("/zulu8.zip"),
        )]));
        let h = harness(|_| {}, manifest);
        let old = local("1.8.145", "adopt", Platform::Linux64, "/opt/jdk8");
        h.provider.registry().insert(old.clone()).expect("insert");
        h.provider.activate(&old.key()).expect("activate");

        let prompt = ScriptedPrompt::accepting();
        let updated = h
            .provider
            .resolve(request("1.8*").vendor(ANY_VENDOR).check_for_updates(true), &prompt)
            .await
            .expect("updated");
        assert_eq!(prompt.updates(), 1);
        assert_eq!(updated.vendor, Vendor::new("zulu"));
        assert!(!updated.active);
        let active = h
            .provider
            .registry()
            .active(Platform::Linux64)
            .expect("previous stays active");
        assert_eq!(active.key(), old.key());
    }

    #[tokio::test]
    async fn background_resolution_and_purge() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/17.zip");
            then.status(200).body(jdk_zip("jdk-17"));
        });
        let manifest = Arc::new(StaticManifest(vec![remote(
            "17.0.1",
            "adopt",
            Platform::Linux64,
            &server.url("/17.zip"),
        )]));
        let h = harness(|_| {}, manifest);
        let prompt: Arc<dyn ProvisionPrompt> = Arc::new(ScriptedPrompt::accepting());
        let runtime = h
            .provider
            .resolve_in_background(request("17+"), prompt)
            .await
            .expect("join")
            .expect("installed");
        assert!(runtime.java_binary().is_file());

        let install_dir = h.provider.coordinator().install_root().join(runtime.key().dir_name());
        assert!(install_dir.is_dir());
        h.provider.remove(&runtime.key(), true).await.expect("remove");
        assert!(!install_dir.exists());
        assert!(h.provider.list().is_empty());
    }
}
