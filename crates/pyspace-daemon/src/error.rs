use pyspace_core::error::PyspaceError;

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Daemon error types
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Service lifecycle error
    #[error("Service error: {0}")]
    Service(String),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Error from the environment store, cache or configuration
    #[error("Core error: {0}")]
    Core(#[from] PyspaceError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    pub fn service<S: Into<String>>(msg: S) -> Self {
        DaemonError::Service(msg.into())
    }

    pub fn watcher<S: Into<String>>(msg: S) -> Self {
        DaemonError::Watcher(msg.into())
    }
}
