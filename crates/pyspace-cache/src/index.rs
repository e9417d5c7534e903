use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pyspace_core::error::{PyspaceError, PyspaceResult};
use pyspace_core::utils::{read_json, write_json_atomic};

/// Name of the index file inside the cache directory
pub const INDEX_FILE_NAME: &str = "metadata.json";

/// Metadata for one cached package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub package: String,
    #[serde(default)]
    pub version: Option<String>,
    pub cached_at: DateTime<Utc>,
}

/// `metadata.json`: checksum -> record
#[derive(Debug, Clone, Default)]
pub struct CacheIndex {
    path: PathBuf,
    entries: BTreeMap<String, CacheRecord>,
}

impl CacheIndex {
    /// Load the index in `cache_dir`, or start an empty one
    pub fn load(cache_dir: &Path) -> PyspaceResult<Self> {
        let path = cache_dir.join(INDEX_FILE_NAME);
        let entries = read_json(&path)
            .map_err(|e| PyspaceError::cache(format!("Failed to read cache index: {}", e)))?
            .unwrap_or_default();
        Ok(Self { path, entries })
    }

    /// Atomically rewrite the index file
    pub fn save(&self) -> PyspaceResult<()> {
        write_json_atomic(&self.path, &self.entries)
    }

    pub fn get(&self, checksum: &str) -> Option<&CacheRecord> {
        self.entries.get(checksum)
    }

    pub fn contains(&self, checksum: &str) -> bool {
        self.entries.contains_key(checksum)
    }

    pub fn insert(&mut self, checksum: String, record: CacheRecord) {
        self.entries.insert(checksum, record);
    }

    /// Drop records cached before `cutoff`, returning how many were removed
    pub fn retain_newer_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, record| record.cached_at >= cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &CacheRecord)> {
        self.entries.iter()
    }
}
