//! Canonical locations of pyspace's per-user state.
//!
//! Everything lives under one home directory, `$PYSPACE_HOME` or
//! `~/.pyspace`:
//!   - config.json    layered configuration
//!   - metadata.json  environment registry
//!   - envs/          one directory per environment
//!   - cache/         downloaded artifacts and their metadata.json
//!   - daemons/       one status file per watched project, written by the
//!                    reconciliation daemon

use std::path::{Path, PathBuf};

const HOME_DIR_NAME: &str = ".pyspace";
pub const HOME_ENV_VAR: &str = "PYSPACE_HOME";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const METADATA_FILE_NAME: &str = "metadata.json";
const STATUS_DIR_NAME: &str = "daemons";
pub const PROJECT_FILE_NAME: &str = "pyspace.json";

/// Resolved pyspace home layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyspacePaths {
    root: PathBuf,
}

impl PyspacePaths {
    /// Use an explicit home directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the home directory from `$PYSPACE_HOME`, falling back to
    /// `~/.pyspace` (or `./.pyspace` when no home directory is known).
    pub fn from_env() -> Self {
        if let Some(root) = std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
            return Self::new(root);
        }

        let root = dirs::home_dir()
            .map(|d| d.join(HOME_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(HOME_DIR_NAME));
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.root.join(METADATA_FILE_NAME)
    }

    pub fn envs_dir(&self) -> PathBuf {
        self.root.join("envs")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Status file of the daemon watching `project_dir`. The name is derived
    /// from the canonical project path.
    pub fn status_file(&self, project_dir: &Path) -> PathBuf {
        self.root
            .join(STATUS_DIR_NAME)
            .join(format!("{}.json", project_key(project_dir)))
    }
}

/// Short stable key for a project directory
pub fn project_key(project_dir: &Path) -> String {
    let dir = std::fs::canonicalize(project_dir).unwrap_or_else(|_| project_dir.to_path_buf());
    let hash = blake3::hash(dir.to_string_lossy().as_bytes());
    hex::encode(&hash.as_bytes()[..8])
}

/// Path of the project declaration file inside `project_dir`
pub fn project_file(project_dir: &Path) -> PathBuf {
    project_dir.join(PROJECT_FILE_NAME)
}
