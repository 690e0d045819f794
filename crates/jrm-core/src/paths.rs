use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::PathsSection;
use crate::util::env_string;

/// Directories the provisioner reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePaths {
    pub state_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl EffectivePaths {
    /// Environment (`JRM_STATE_DIR`, `JRM_CACHE_DIR`) wins over the config file,
    /// which wins over per-user platform defaults.
    pub fn resolve(section: Option<&PathsSection>) -> Self {
        let proj_dirs = directories::ProjectDirs::from("org", "jrm", "jrm");
        let default_state = proj_dirs
            .as_ref()
            .map(|p| p.data_local_dir().to_path_buf())
            .or_else(|| std::env::var_os("LOCALAPPDATA").map(PathBuf::from))
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".jrm")))
            .unwrap_or_else(|| PathBuf::from(".jrm"));
        let default_cache = proj_dirs
            .as_ref()
            .map(|p| p.cache_dir().to_path_buf())
            .unwrap_or_else(|| default_state.join("cache"));

        let state_dir = env_string("JRM_STATE_DIR")
            .or_else(|| section.and_then(|s| s.state_dir.clone()))
            .map(|raw| PathBuf::from(expand_vars(&raw)))
            .unwrap_or(default_state);
        let cache_dir = env_string("JRM_CACHE_DIR")
            .or_else(|| section.and_then(|s| s.cache_dir.clone()))
            .map(|raw| PathBuf::from(expand_vars(&raw)))
            .unwrap_or(default_cache);

        Self {
            state_dir,
            cache_dir,
        }
    }

    pub fn registry_file(&self) -> PathBuf {
        self.state_dir.join(crate::registry::REGISTRY_FILE)
    }

    pub fn install_root(&self) -> PathBuf {
        self.cache_dir.join("runtimes")
    }
}

/// Small `%VAR%` and `$VAR` expansion for portable config files.
pub fn expand_vars(raw: &str) -> String {
    let mut out = raw.to_string();
    for (key, value) in std::env::vars() {
        let windows = format!("%{key}%");
        if out.contains(&windows) {
            out = out.replace(&windows, &value);
        }
        let unix = format!("${key}");
        if out.contains(&unix) {
            out = out.replace(&unix, &value);
        }
    }
    out
}

/// Locate a config file relative to `JRM_CONFIG_DIR`, the per-user config
/// directory, the executable directory, or the working directory.
pub fn resolve_config_path(rel: &str) -> Option<PathBuf> {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return rel_path.exists().then(|| rel_path.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(cfg_dir) = env_string("JRM_CONFIG_DIR") {
        candidates.push(PathBuf::from(cfg_dir));
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("org", "jrm", "jrm") {
        candidates.push(proj_dirs.config_dir().to_path_buf());
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.push(exe_dir.to_path_buf());
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd);
    }

    candidates
        .into_iter()
        .map(|base| base.join(rel))
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::env;

    #[test]
    fn env_dirs_override_config_section() {
        let mut guard = env::guard();
        guard.set("JRM_STATE_DIR", "/var/lib/jrm");
        guard.remove("JRM_CACHE_DIR");
        let section = PathsSection {
            state_dir: Some("/ignored".into()),
            cache_dir: Some("/srv/jrm-cache".into()),
        };
        let paths = EffectivePaths::resolve(Some(&section));
        assert_eq!(paths.state_dir, PathBuf::from("/var/lib/jrm"));
        assert_eq!(paths.cache_dir, PathBuf::from("/srv/jrm-cache"));
        assert_eq!(
            paths.registry_file(),
            PathBuf::from("/var/lib/jrm").join("registry.json")
        );
    }

    #[test]
    fn expands_environment_references() {
        let mut guard = env::guard();
        guard.set("JRM_TEST_ROOT", "/data");
        assert_eq!(expand_vars("$JRM_TEST_ROOT/jdks"), "/data/jdks");
        assert_eq!(expand_vars("%JRM_TEST_ROOT%/jdks"), "/data/jdks");
        assert_eq!(expand_vars("/plain"), "/plain");
    }

    #[test]
    fn config_dir_env_is_searched_first() {
        let mut guard = env::guard();
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("jrm-test.toml"), "").expect("write");
        guard.set(
            "JRM_CONFIG_DIR",
            dir.path().to_str().expect("utf8 tempdir"),
        );
        assert_eq!(
            resolve_config_path("jrm-test.toml"),
            Some(dir.path().join("jrm-test.toml"))
        );
        assert_eq!(resolve_config_path("missing-jrm-test.toml"), None);
    }
}
