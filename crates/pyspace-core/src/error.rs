use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Custom result type for pyspace operations
pub type PyspaceResult<T> = Result<T, PyspaceError>;

/// Custom error type for pyspace operations
#[derive(Debug, Error)]
pub enum PyspaceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("External tool failed: {tool} - {message}")]
    ExternalTool { tool: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl PyspaceError {
    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        PyspaceError::NotFound(msg.into())
    }

    /// Create a new already-exists error
    pub fn already_exists<S: Into<String>>(msg: S) -> Self {
        PyspaceError::AlreadyExists(msg.into())
    }

    /// Create a new external tool error
    pub fn external_tool<T: Into<String>, S: Into<String>>(tool: T, msg: S) -> Self {
        PyspaceError::ExternalTool {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        PyspaceError::Validation(msg.into())
    }

    /// Create a new IO error
    pub fn io<S: Into<String>>(msg: S) -> Self {
        PyspaceError::Io(msg.into())
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        PyspaceError::Serialization(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PyspaceError::Config(msg.into())
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(msg: S) -> Self {
        PyspaceError::Cache(msg.into())
    }

    /// Whether this is an expected domain outcome rather than a failure of
    /// the machinery (missing or colliding names, bad input).
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            PyspaceError::NotFound(_) | PyspaceError::AlreadyExists(_) | PyspaceError::Validation(_)
        )
    }
}

impl From<serde_json::Error> for PyspaceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<io::Error> for PyspaceError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<tempfile::PersistError> for PyspaceError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error.to_string())
    }
}
