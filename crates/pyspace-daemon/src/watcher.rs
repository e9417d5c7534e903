//! Polling watcher for a single file.
//!
//! The watcher compares the file's modification time on every tick and calls
//! its callback when the time moves forward. It never uses OS notification
//! APIs, so it behaves the same on every platform and on network filesystems.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

/// What happened to the watched file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Modified,
}

/// Notification delivered to the watcher callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchKind,
}

/// Cloneable handle that ends a watcher's poll loop from another task
#[derive(Debug, Clone)]
pub struct WatchStopper {
    watching: Arc<AtomicBool>,
}

impl WatchStopper {
    pub fn stop(&self) {
        self.watching.store(false, Ordering::SeqCst);
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }
}

/// Watches one file by polling its modification time
pub struct FileWatcher<F>
where
    F: FnMut(WatchEvent) + Send,
{
    path: PathBuf,
    poll_interval: Duration,
    last_modified: Option<SystemTime>,
    watching: Arc<AtomicBool>,
    on_change: F,
}

impl<F> FileWatcher<F>
where
    F: FnMut(WatchEvent) + Send,
{
    /// A watcher for `path`. It is armed immediately; once stopped it stays
    /// stopped.
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration, on_change: F) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            last_modified: None,
            watching: Arc::new(AtomicBool::new(true)),
            on_change,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time seen by the last successful tick
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    /// Check the file once. Returns whether the callback fired.
    pub fn tick(&mut self) -> bool {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return false,
            Err(e) => {
                warn!("Failed to read metadata for {}: {}", self.path.display(), e);
                return false;
            }
        };

        match self.last_modified {
            None => {
                debug!(path = %self.path.display(), "Recorded baseline modification time");
                self.last_modified = Some(modified);
                false
            }
            Some(previous) if modified > previous => {
                self.last_modified = Some(modified);
                (self.on_change)(WatchEvent {
                    path: self.path.clone(),
                    kind: WatchKind::Modified,
                });
                true
            }
            Some(_) => false,
        }
    }

    /// Poll until stopped. The flag is only checked between polls.
    pub async fn start(&mut self) {
        debug!(path = %self.path.display(), "File watcher started");
        while self.watching.load(Ordering::SeqCst) {
            self.tick();
            tokio::time::sleep(self.poll_interval).await;
        }
        debug!(path = %self.path.display(), "File watcher stopped");
    }

    /// Clear the watching flag. A poll that is already sleeping finishes its
    /// sleep first.
    pub fn stop(&self) {
        self.watching.store(false, Ordering::SeqCst);
    }

    pub fn stop_handle(&self) -> WatchStopper {
        WatchStopper {
            watching: self.watching.clone(),
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }
}
