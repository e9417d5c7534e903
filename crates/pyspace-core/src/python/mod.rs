//! Python interpreter discovery.
//!
//! [`InterpreterResolver`] turns a requested version string into an
//! interpreter path by asking each [`VersionBackend`] in order and, when none
//! of them knows the version, falling back to the system interpreter.

mod backend;

pub use backend::{
    interpreter_in_prefix, parse_uv_listing, parse_version_listing, PyenvBackend, UvBackend,
    VersionBackend,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::PyspaceConfig;
use crate::error::{PyspaceError, PyspaceResult};
use crate::process::CommandRunner;

/// Environment variable naming an explicit fallback interpreter
pub const PYTHON_ENV_VAR: &str = "PYSPACE_PYTHON";

static FULL_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").expect("valid full-version pattern"));
static VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+){0,2}$").expect("valid version pattern"));

/// Whether `version` is an exact `major.minor.patch` version
pub fn is_full_version(version: &str) -> bool {
    FULL_VERSION.is_match(version)
}

/// Check that `version` looks like `3`, `3.11` or `3.11.4`
pub fn validate_version(version: &str) -> PyspaceResult<()> {
    if VERSION.is_match(version) {
        Ok(())
    } else {
        Err(PyspaceError::validation(format!(
            "invalid Python version '{}', expected MAJOR[.MINOR[.PATCH]]",
            version
        )))
    }
}

/// The interpreter used when no backend can serve a version: `$PYSPACE_PYTHON`,
/// else `python3` or `python` from `PATH`.
pub fn system_interpreter() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(PYTHON_ENV_VAR).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }
    ["python3", "python"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Resolves Python versions to interpreter paths
pub struct InterpreterResolver {
    backends: Vec<Arc<dyn VersionBackend>>,
    fallback: Option<PathBuf>,
    auto_install: bool,
}

impl InterpreterResolver {
    pub fn new(backends: Vec<Arc<dyn VersionBackend>>, fallback: Option<PathBuf>) -> Self {
        Self {
            backends,
            fallback,
            auto_install: false,
        }
    }

    /// pyenv then uv, with the system interpreter as fallback
    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &PyspaceConfig) -> Self {
        let backends: Vec<Arc<dyn VersionBackend>> = vec![
            Arc::new(PyenvBackend::new(
                runner.clone(),
                config.query_timeout(),
                config.command_timeout(),
            )),
            Arc::new(UvBackend::new(
                runner,
                config.query_timeout(),
                config.command_timeout(),
            )),
        ];
        Self::new(backends, system_interpreter()).with_auto_install(config.auto_install_python)
    }

    /// Install missing full versions before resolving them
    pub fn with_auto_install(mut self, enabled: bool) -> Self {
        self.auto_install = enabled;
        self
    }

    pub fn backends(&self) -> &[Arc<dyn VersionBackend>] {
        &self.backends
    }

    pub fn fallback(&self) -> Option<&Path> {
        self.fallback.as_deref()
    }

    /// Find an interpreter for `version`.
    ///
    /// Tries each backend's exact lookup, then (for full versions) each
    /// backend's install prefix, then the fallback interpreter. The fallback
    /// is returned even though it may be a different version.
    pub async fn resolve(&self, version: &str) -> Option<PathBuf> {
        let full = is_full_version(version);

        if self.auto_install && full && !self.ensure_installed(version).await {
            warn!("Could not install Python {} with any backend", version);
        }

        for backend in &self.backends {
            if let Some(path) = backend.which(version).await {
                debug!(backend = %backend.name(), path = %path.display(), "Resolved Python {}", version);
                return Some(path);
            }
        }

        if full {
            for backend in &self.backends {
                if let Some(path) = backend.installed_path(version).await {
                    debug!(backend = %backend.name(), path = %path.display(), "Found installed Python {}", version);
                    return Some(path);
                }
            }
        }

        match &self.fallback {
            Some(path) => {
                warn!(
                    "No backend provides Python {}; falling back to {}",
                    version,
                    path.display()
                );
                Some(path.clone())
            }
            None => {
                warn!("No interpreter found for Python {}", version);
                None
            }
        }
    }

    /// Make sure a full version is installed by some backend.
    pub async fn ensure_installed(&self, version: &str) -> bool {
        if !is_full_version(version) {
            return false;
        }

        for backend in &self.backends {
            if backend
                .installed_versions()
                .await
                .iter()
                .any(|v| v == version)
            {
                debug!(backend = %backend.name(), "Python {} already installed", version);
                return true;
            }
        }

        for backend in &self.backends {
            if backend.install(version).await {
                info!("Installed Python {} with {}", version, backend.name());
                return true;
            }
        }

        false
    }
}
