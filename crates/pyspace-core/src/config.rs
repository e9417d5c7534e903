use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PyspaceError, PyspaceResult};
use crate::paths::{project_file, PyspacePaths};
use crate::utils::{read_json, write_json_atomic};

pub const DEFAULT_PYTHON_VERSION: &str = "3.11";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Per-user configuration stored in `config.json`.
///
/// Values are layered: built-in defaults, then the file (missing keys keep
/// their defaults), then `PYSPACE_*` environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PyspaceConfig {
    /// Interpreter version used when `create` is not given one
    pub python_version: String,
    /// Environment used when the project declares none
    pub default_env: Option<String>,
    /// Whether the daemon reconciles the project declaration
    pub auto_sync: bool,
    /// Ask version-manager backends to install missing full versions
    pub auto_install_python: bool,
    /// Upper bound for long-running tools (venv creation, installs)
    pub command_timeout_secs: u64,
    /// Upper bound for short backend queries
    pub query_timeout_secs: u64,
}

impl Default for PyspaceConfig {
    fn default() -> Self {
        Self {
            python_version: DEFAULT_PYTHON_VERSION.to_string(),
            default_env: None,
            auto_sync: true,
            auto_install_python: false,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
        }
    }
}

impl PyspaceConfig {
    /// Load the layered configuration without touching the filesystem
    /// beyond reading `config.json`.
    pub fn load(paths: &PyspacePaths) -> PyspaceResult<Self> {
        let mut config: Self = read_json(&paths.config_file())?.unwrap_or_default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load the configuration, writing the defaults to disk on first use.
    pub fn load_or_init(paths: &PyspacePaths) -> PyspaceResult<Self> {
        let file = paths.config_file();
        if !file.exists() {
            info!("Writing default configuration to {}", file.display());
            write_json_atomic(&file, &Self::default())?;
        }
        Self::load(paths)
    }

    /// Persist this configuration to `config.json`
    pub fn save(&self, paths: &PyspacePaths) -> PyspaceResult<()> {
        write_json_atomic(&paths.config_file(), self)
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> PyspaceResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PYSPACE_AUTO_SYNC") {
            self.auto_sync = parse_flag("PYSPACE_AUTO_SYNC", &value)?;
            debug!(auto_sync = self.auto_sync, "auto_sync overridden from environment");
        }
        if let Some(value) = lookup("PYSPACE_PYTHON_VERSION").filter(|v| !v.trim().is_empty()) {
            self.python_version = value.trim().to_string();
        }
        if let Some(value) = lookup("PYSPACE_DEFAULT_ENV") {
            let value = value.trim();
            self.default_env = (!value.is_empty()).then(|| value.to_string());
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

fn parse_flag(key: &str, value: &str) -> PyspaceResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PyspaceError::config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

/// Per-project declaration stored in `pyspace.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDeclaration {
    /// Name of the environment this project wants active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl ProjectDeclaration {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: Some(environment.into()),
        }
    }

    /// Read the declaration from `project_dir`, if one exists
    pub fn load(project_dir: &Path) -> PyspaceResult<Option<Self>> {
        Self::load_file(&project_file(project_dir))
    }

    /// Read a declaration from an explicit file path
    pub fn load_file(path: &Path) -> PyspaceResult<Option<Self>> {
        read_json(path)
    }

    /// Write the declaration into `project_dir`
    pub fn save(&self, project_dir: &Path) -> PyspaceResult<()> {
        let path = project_file(project_dir);
        write_json_atomic(&path, self)?;
        info!("Saved project declaration to {}", path.display());
        Ok(())
    }
}

/// The environment a project should use: its declaration, else the
/// configured default.
pub fn current_environment(
    project_dir: &Path,
    config: &PyspaceConfig,
) -> PyspaceResult<Option<String>> {
    let declared = ProjectDeclaration::load(project_dir)?.and_then(|d| d.environment);
    Ok(declared.or_else(|| config.default_env.clone()))
}
