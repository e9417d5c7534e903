//! Background reconciliation for the pyspace Python environment manager.
//!
//! The daemon watches a project's `pyspace.json` and periodically checks the
//! declared environment against the environment store.

pub mod error;
pub mod service;
pub mod status;
pub mod watcher;

// Re-export commonly used types
pub use error::{DaemonError, DaemonResult};
pub use service::{DaemonSettings, ReconcileOutcome, ReconciliationDaemon, WatcherHandle};
pub use status::{DaemonStatus, RunState, StatusFile};
pub use watcher::{FileWatcher, WatchEvent, WatchKind, WatchStopper};
