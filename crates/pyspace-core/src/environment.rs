//! Named environments on disk.
//!
//! Each environment is a directory under `envs/`. The directory is the source
//! of truth; `metadata.json` only remembers the version and creation time of
//! environments pyspace created itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PyspaceConfig;
use crate::error::{PyspaceError, PyspaceResult};
use crate::paths::PyspacePaths;
use crate::process::{CommandRunner, Invocation};
use crate::python::{validate_version, InterpreterResolver};
use crate::utils::{create_dir_all, read_json, write_json_atomic};

/// Version reported for directories without a registry entry
pub const UNKNOWN_VERSION: &str = "unknown";

/// A live environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub created_at: Option<DateTime<Utc>>,
}

/// Registry entry persisted in `metadata.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub version: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// One row of `list()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentInfo {
    pub name: String,
    pub path: PathBuf,
    pub version: String,
    pub active: bool,
}

type Registry = BTreeMap<String, EnvironmentRecord>;

/// Check that `name` is usable as a single directory component
pub fn validate_name(name: &str) -> PyspaceResult<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if name.is_empty() || name == "." || name == ".." || !valid_chars {
        return Err(PyspaceError::validation(format!(
            "invalid environment name '{}', use letters, digits, '.', '_' or '-'",
            name
        )));
    }
    Ok(())
}

/// Materializes an environment directory from an interpreter
#[async_trait]
pub trait EnvironmentBuilder: Send + Sync {
    async fn build(&self, python: &Path, target: &Path) -> PyspaceResult<()>;
}

/// Builds environments with `<python> -m venv <target>`
pub struct VenvBuilder {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl VenvBuilder {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

#[async_trait]
impl EnvironmentBuilder for VenvBuilder {
    async fn build(&self, python: &Path, target: &Path) -> PyspaceResult<()> {
        let invocation = Invocation::new(python)
            .args(["-m", "venv"])
            .arg(target)
            .timeout(self.timeout);
        self.runner.run_checked(&invocation).await?;
        Ok(())
    }
}

/// Install a package with `<python> -m pip install [--find-links DIR] <spec>`
pub async fn pip_install(
    runner: &dyn CommandRunner,
    python: &Path,
    spec: &str,
    find_links: Option<&Path>,
    timeout: Duration,
) -> PyspaceResult<()> {
    let mut invocation = Invocation::new(python).args(["-m", "pip", "install"]);
    if let Some(dir) = find_links {
        invocation = invocation.arg("--find-links").arg(dir);
    }
    let invocation = invocation.arg(spec).timeout(timeout);

    info!("Installing {} with {}", spec, python.display());
    runner.run_checked(&invocation).await?;
    Ok(())
}

/// Directory-backed registry of named environments
pub struct EnvironmentStore {
    base: PathBuf,
    metadata_file: PathBuf,
    resolver: InterpreterResolver,
    builder: Arc<dyn EnvironmentBuilder>,
    registry_lock: Mutex<()>,
}

impl EnvironmentStore {
    pub fn new(
        paths: &PyspacePaths,
        resolver: InterpreterResolver,
        builder: Arc<dyn EnvironmentBuilder>,
    ) -> Self {
        Self {
            base: paths.envs_dir(),
            metadata_file: paths.metadata_file(),
            resolver,
            builder,
            registry_lock: Mutex::new(()),
        }
    }

    /// Store wired to the real backends and `python -m venv`
    pub fn from_config(
        paths: &PyspacePaths,
        config: &PyspaceConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let resolver = InterpreterResolver::from_config(runner.clone(), config);
        let builder = Arc::new(VenvBuilder::new(runner, config.command_timeout()));
        Self::new(paths, resolver, builder)
    }

    /// Directory holding all environments
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn resolver(&self) -> &InterpreterResolver {
        &self.resolver
    }

    /// Create environment `name` from Python `version`.
    ///
    /// Nothing is recorded unless the builder succeeds. A builder failure may
    /// leave a partial directory behind.
    pub async fn create(&self, name: &str, version: &str) -> PyspaceResult<Environment> {
        validate_name(name)?;
        validate_version(version)?;

        let path = self.base.join(name);
        if path.exists() {
            return Err(PyspaceError::already_exists(format!("environment '{}'", name)));
        }

        let python = self.resolver.resolve(version).await.ok_or_else(|| {
            PyspaceError::not_found(format!("Python {} interpreter", version))
        })?;

        create_dir_all(&self.base)?;
        info!("Creating environment '{}' with {}", name, python.display());
        self.builder.build(&python, &path).await?;

        let record = EnvironmentRecord {
            version: version.to_string(),
            path: path.clone(),
            created_at: Utc::now(),
        };
        self.update_registry(|registry| {
            registry.insert(name.to_string(), record.clone());
            true
        })?;

        Ok(Environment {
            name: name.to_string(),
            version: record.version,
            path,
            created_at: Some(record.created_at),
        })
    }

    /// All environment directories, in directory enumeration order.
    ///
    /// Registry entries whose directory has disappeared are dropped.
    pub fn list(&self) -> PyspaceResult<Vec<EnvironmentInfo>> {
        let entries = match std::fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let registry = self.read_registry()?;
        let mut envs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let version = registry
                .get(&name)
                .map(|r| r.version.clone())
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
            envs.push(EnvironmentInfo {
                active: self.is_active(&name),
                path: entry.path(),
                name,
                version,
            });
        }

        if registry.keys().any(|name| !self.base.join(name).is_dir()) {
            self.update_registry(|registry| {
                let before = registry.len();
                registry.retain(|name, _| self.base.join(name).is_dir());
                debug!("Dropped {} stale registry entries", before - registry.len());
                registry.len() != before
            })?;
        }

        Ok(envs)
    }

    /// Look up one environment
    pub fn get(&self, name: &str) -> PyspaceResult<Option<Environment>> {
        let Some(path) = self.existing_dir(name) else {
            return Ok(None);
        };
        let record = self.read_registry()?.remove(name);
        Ok(Some(Environment {
            name: name.to_string(),
            version: record
                .as_ref()
                .map(|r| r.version.clone())
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            path,
            created_at: record.map(|r| r.created_at),
        }))
    }

    /// Number of environment directories
    pub fn count(&self) -> PyspaceResult<usize> {
        Ok(self.list()?.len())
    }

    /// Delete environment `name` and its registry entry
    pub fn remove(&self, name: &str) -> PyspaceResult<()> {
        let path = self
            .existing_dir(name)
            .ok_or_else(|| PyspaceError::not_found(format!("environment '{}'", name)))?;

        std::fs::remove_dir_all(&path)?;
        info!("Removed environment '{}'", name);

        self.update_registry(|registry| registry.remove(name).is_some())
            .map_err(|e| {
                warn!("Environment '{}' deleted but registry update failed: {}", name, e);
                PyspaceError::io(format!("failed to update registry after removing '{}': {}", name, e))
            })
    }

    /// Script that activates `name` in a shell
    pub fn activation_script(&self, name: &str) -> Option<PathBuf> {
        let dir = self.existing_dir(name)?;
        Some(if cfg!(windows) {
            dir.join("Scripts").join("activate.bat")
        } else {
            dir.join("bin").join("activate")
        })
    }

    /// Interpreter inside environment `name`
    pub fn python_executable(&self, name: &str) -> Option<PathBuf> {
        let dir = self.existing_dir(name)?;
        Some(if cfg!(windows) {
            dir.join("Scripts").join("python.exe")
        } else {
            dir.join("bin").join("python")
        })
    }

    /// Whether `name` is active in the current session.
    ///
    /// Always false: pyspace does not track shell sessions, so there is no
    /// record to consult.
    pub fn is_active(&self, _name: &str) -> bool {
        false
    }

    fn existing_dir(&self, name: &str) -> Option<PathBuf> {
        validate_name(name).ok()?;
        let path = self.base.join(name);
        path.is_dir().then_some(path)
    }

    fn read_registry(&self) -> PyspaceResult<Registry> {
        Ok(read_json(&self.metadata_file)?.unwrap_or_default())
    }

    /// Re-read, modify and atomically rewrite the registry under the lock.
    /// `modify` returns whether anything changed.
    fn update_registry<F>(&self, modify: F) -> PyspaceResult<()>
    where
        F: FnOnce(&mut Registry) -> bool,
    {
        let _guard = self.lock_registry();
        let mut registry = self.read_registry()?;
        if modify(&mut registry) {
            write_json_atomic(&self.metadata_file, &registry)?;
        }
        Ok(())
    }

    fn lock_registry(&self) -> MutexGuard<'_, ()> {
        // The guarded unit carries no state, so a poisoned lock is still usable.
        self.registry_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
