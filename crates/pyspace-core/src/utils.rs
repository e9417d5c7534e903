use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{PyspaceError, PyspaceResult};

/// Create a directory and all its parent directories
pub fn create_dir_all(path: impl AsRef<Path>) -> PyspaceResult<()> {
    std::fs::create_dir_all(path).map_err(PyspaceError::from)
}

/// Read a JSON document, returning `None` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> PyspaceResult<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// The document is written to a temporary file in the same directory and then
/// renamed into place, so readers never observe a truncated file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> PyspaceResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| PyspaceError::InvalidPath(path.to_path_buf()))?;
    create_dir_all(parent)?;

    let contents = serde_json::to_string_pretty(value)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
