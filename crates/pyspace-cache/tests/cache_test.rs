use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pyspace_cache::{checksum, CacheRecord, PackageCache, INDEX_FILE_NAME};
use pyspace_core::error::{PyspaceError, PyspaceResult};
use pyspace_core::process::{CommandOutput, CommandRunner, Invocation};
use tempfile::tempdir;

#[derive(Default)]
struct RecordingRunner {
    fail: bool,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> PyspaceResult<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.to_string());
        if self.fail {
            Ok(CommandOutput::failure(1, "No matching distribution found"))
        } else {
            Ok(CommandOutput::success_with(""))
        }
    }
}

#[test]
fn test_record_and_lookup() {
    let dir = tempdir().unwrap();
    let cache = PackageCache::new(dir.path().join("cache"));

    assert!(!cache.is_cached("requests", Some("2.31.0")).unwrap());
    let key = cache.record("requests", Some("2.31.0")).unwrap();
    assert_eq!(key, checksum("requests", Some("2.31.0")));

    assert!(cache.is_cached("requests", Some("2.31.0")).unwrap());
    assert!(!cache.is_cached("requests", None).unwrap());
    assert!(dir.path().join("cache").join(INDEX_FILE_NAME).exists());
}

#[test]
fn test_info_counts_records_and_bytes() {
    let dir = tempdir().unwrap();
    let cache = PackageCache::new(dir.path().join("cache"));

    let empty = cache.info().unwrap();
    assert_eq!(empty.total_packages, 0);
    assert_eq!(empty.total_size, 0);

    cache.record("six", None).unwrap();
    std::fs::write(cache.dir().join("six-1.16.0-py2.py3-none-any.whl"), vec![0u8; 1024]).unwrap();

    let info = cache.info().unwrap();
    assert_eq!(info.total_packages, 1);
    assert!(info.total_size >= 1024);
    assert_eq!(info.cache_dir, cache.dir());
}

#[test]
fn test_clear_empties_cache() {
    let dir = tempdir().unwrap();
    let cache = PackageCache::new(dir.path().join("cache"));
    cache.record("six", None).unwrap();
    std::fs::write(cache.dir().join("six.whl"), b"wheel").unwrap();

    cache.clear().unwrap();

    let info = cache.info().unwrap();
    assert_eq!(info.total_packages, 0);
    assert_eq!(info.total_size, 0);
    assert!(cache.dir().is_dir());

    // Clearing twice is fine.
    cache.clear().unwrap();
}

#[test]
fn test_prune_drops_old_records() {
    let dir = tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    std::fs::create_dir_all(&cache_dir).unwrap();

    let old = CacheRecord {
        package: "old".to_string(),
        version: None,
        cached_at: Utc::now() - chrono::Duration::days(30),
    };
    let mut index = BTreeMap::new();
    index.insert(checksum("old", None), old);
    std::fs::write(
        cache_dir.join(INDEX_FILE_NAME),
        serde_json::to_string(&index).unwrap(),
    )
    .unwrap();

    let cache = PackageCache::new(&cache_dir);
    cache.record("fresh", Some("1.0")).unwrap();

    let removed = cache.prune(Duration::from_secs(7 * 24 * 3600)).unwrap();
    assert_eq!(removed, 1);
    assert!(!cache.is_cached("old", None).unwrap());
    assert!(cache.is_cached("fresh", Some("1.0")).unwrap());
}

#[test]
fn test_prune_with_unbounded_age_keeps_everything() {
    let dir = tempdir().unwrap();
    let cache = PackageCache::new(dir.path().join("cache"));
    cache.record("requests", Some("2.31.0")).unwrap();

    let huge = Duration::from_secs(100_000_000u64.saturating_mul(86_400));
    assert_eq!(cache.prune(huge).unwrap(), 0);
    assert_eq!(cache.prune(Duration::from_secs(u64::MAX)).unwrap(), 0);
    assert!(cache.is_cached("requests", Some("2.31.0")).unwrap());
}

#[tokio::test]
async fn test_download_invokes_pip() {
    let dir = tempdir().unwrap();
    let cache = PackageCache::new(dir.path().join("cache"));
    let runner = RecordingRunner::default();

    cache
        .download(&runner, Path::new("/env/bin/python"), "requests", Duration::from_secs(5))
        .await
        .unwrap();

    let calls = runner.calls.lock().unwrap();
    assert_eq!(
        calls.as_slice(),
        &[format!(
            "/env/bin/python -m pip download --dest {} requests",
            cache.dir().display()
        )]
    );
}

#[tokio::test]
async fn test_download_failure_is_external_tool_error() {
    let dir = tempdir().unwrap();
    let cache = PackageCache::new(dir.path().join("cache"));
    let runner = RecordingRunner {
        fail: true,
        ..RecordingRunner::default()
    };

    let result = cache
        .download(&runner, Path::new("python3"), "no-such-package", Duration::from_secs(5))
        .await;
    assert!(matches!(result, Err(PyspaceError::ExternalTool { .. })));
}
