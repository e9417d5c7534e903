//! Package download cache for pyspace.
//!
//! Downloaded artifacts live flat in the cache directory, next to a
//! `metadata.json` index keyed by the BLAKE3 checksum of `package[@version]`.
//! `pip install --find-links <cache>` then installs from those files.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use pyspace_core::error::{PyspaceError, PyspaceResult};
use pyspace_core::paths::PyspacePaths;
use pyspace_core::process::{CommandRunner, Invocation};
use pyspace_core::utils::create_dir_all;

pub mod index;

pub use index::{CacheIndex, CacheRecord, INDEX_FILE_NAME};

/// Lowercase hex BLAKE3 of `package` or `package@version`
pub fn checksum(package: &str, version: Option<&str>) -> String {
    let key = match version {
        Some(version) => format!("{}@{}", package, version),
        None => package.to_string(),
    };
    hex::encode(blake3::hash(key.as_bytes()).as_bytes())
}

/// Split a requirement such as `requests==2.31.0` into name and pinned
/// version. Anything other than an exact `==` pin has no version.
pub fn split_requirement(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once("==") {
        Some((name, version)) if !name.trim().is_empty() && !version.trim().is_empty() => {
            (name.trim(), Some(version.trim()))
        }
        _ => (spec.trim(), None),
    }
}

/// Snapshot of cache usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub total_packages: usize,
    pub total_size: u64,
    pub cache_dir: PathBuf,
}

/// Cache of downloaded package artifacts
pub struct PackageCache {
    dir: PathBuf,
    index_lock: Mutex<()>,
}

impl PackageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn from_paths(paths: &PyspacePaths) -> Self {
        Self::new(paths.cache_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_cached(&self, package: &str, version: Option<&str>) -> PyspaceResult<bool> {
        Ok(CacheIndex::load(&self.dir)?.contains(&checksum(package, version)))
    }

    /// Remember that `package[@version]` is in the cache
    pub fn record(&self, package: &str, version: Option<&str>) -> PyspaceResult<String> {
        let key = checksum(package, version);
        let _guard = self.lock_index();
        let mut index = CacheIndex::load(&self.dir)?;
        index.insert(
            key.clone(),
            CacheRecord {
                package: package.to_string(),
                version: version.map(str::to_string),
                cached_at: Utc::now(),
            },
        );
        index.save()?;
        debug!(package, ?version, checksum = %key, "Recorded cached package");
        Ok(key)
    }

    /// Count indexed packages and sum the size of every cached file
    pub fn info(&self) -> PyspaceResult<CacheInfo> {
        let total_packages = CacheIndex::load(&self.dir)?.len();
        let total_size = if self.dir.exists() {
            WalkDir::new(&self.dir)
                .min_depth(1)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
                .filter_map(|e| e.ok())
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len())
                .sum()
        } else {
            0
        };

        Ok(CacheInfo {
            total_packages,
            total_size,
            cache_dir: self.dir.clone(),
        })
    }

    /// Delete every cached file and the index
    pub fn clear(&self) -> PyspaceResult<()> {
        let _guard = self.lock_index();
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PyspaceError::cache(format!(
                    "Failed to clear {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        }
        create_dir_all(&self.dir)?;
        info!("Cleared package cache at {}", self.dir.display());
        Ok(())
    }

    /// Drop index records and artifacts older than `max_age`.
    /// Returns the number of index records removed.
    pub fn prune(&self, max_age: Duration) -> PyspaceResult<usize> {
        // Ages beyond chrono's range reach back before any record.
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let file_cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let _guard = self.lock_index();
        let mut index = CacheIndex::load(&self.dir)?;
        let removed = index.retain_newer_than(cutoff);
        if removed > 0 {
            index.save()?;
        }

        if self.dir.exists() {
            for entry in WalkDir::new(&self.dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
                .filter_map(|e| e.ok())
            {
                if entry.file_name() == INDEX_FILE_NAME {
                    continue;
                }
                let stale = entry
                    .metadata()
                    .ok()
                    .filter(|m| m.is_file())
                    .and_then(|m| m.modified().ok())
                    .map_or(false, |modified| modified < file_cutoff);
                if stale {
                    if let Err(e) = std::fs::remove_file(entry.path()) {
                        warn!("Failed to prune {}: {}", entry.path().display(), e);
                    }
                }
            }
        }

        info!("Pruned {} cache records", removed);
        Ok(removed)
    }

    /// Download `spec` and its dependencies into the cache with pip
    pub async fn download(
        &self,
        runner: &dyn CommandRunner,
        python: &Path,
        spec: &str,
        timeout: Duration,
    ) -> PyspaceResult<()> {
        create_dir_all(&self.dir)?;
        let invocation = Invocation::new(python)
            .args(["-m", "pip", "download", "--dest"])
            .arg(&self.dir)
            .arg(spec)
            .timeout(timeout);
        runner.run_checked(&invocation).await?;
        info!("Downloaded {} into {}", spec, self.dir.display());
        Ok(())
    }

    fn lock_index(&self) -> MutexGuard<'_, ()> {
        self.index_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Temporary files from atomic writes start with a dot
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('.'))
}
