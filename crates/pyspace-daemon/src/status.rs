use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pyspace_cache::CacheInfo;
use pyspace_core::utils::{read_json, write_json_atomic};

use crate::error::DaemonResult;

/// Lifecycle state recorded in the status file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
}

/// Snapshot returned by `ReconciliationDaemon::status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub environment_count: usize,
    pub cache: CacheInfo,
}

/// Contents of a project's status file, written by the daemon so that other
/// processes can see what it is doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFile {
    pub pid: u32,
    pub state: RunState,
    /// Declaration file the daemon watches
    pub project_file: PathBuf,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<String>,
}

impl StatusFile {
    pub fn new(project_file: impl Into<PathBuf>) -> Self {
        Self {
            pid: std::process::id(),
            state: RunState::Stopped,
            project_file: project_file.into(),
            started_at: Utc::now(),
            last_reconcile: None,
            last_outcome: None,
        }
    }

    /// Atomically replace the status file at `path`
    pub fn write(&self, path: &Path) -> DaemonResult<()> {
        write_json_atomic(path, self)?;
        Ok(())
    }

    /// Read the status file, if one has been written
    pub fn read(path: &Path) -> DaemonResult<Option<Self>> {
        Ok(read_json(path)?)
    }
}
