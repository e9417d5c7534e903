//! Reconciliation daemon.
//!
//! The daemon runs two tasks: a tick loop that reconciles the project's
//! declared environment on a fixed interval, and a [`FileWatcher`] that
//! triggers an extra reconcile as soon as `pyspace.json` changes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use pyspace_cache::PackageCache;
use pyspace_core::config::{ProjectDeclaration, PyspaceConfig};
use pyspace_core::environment::EnvironmentStore;
use pyspace_core::error::PyspaceResult;
use pyspace_core::paths::{project_file, PyspacePaths};

use crate::error::{DaemonError, DaemonResult};
use crate::status::{DaemonStatus, RunState, StatusFile};
use crate::watcher::{FileWatcher, WatchEvent, WatchStopper};

/// Daemon timing and signal handling
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    /// Time between periodic reconciles
    pub tick_interval: Duration,
    /// Time between watcher polls
    pub poll_interval: Duration,
    /// How long `stop` waits for the watcher task
    pub join_timeout: Duration,
    /// Treat Ctrl-C as a request to stop
    pub handle_interrupts: bool,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            join_timeout: Duration::from_secs(2),
            handle_interrupts: true,
        }
    }
}

/// Result of one reconcile pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// `auto_sync` is off
    Disabled,
    /// The project declares no environment
    NoDeclaration,
    /// The declared environment does not exist
    MissingEnvironment(String),
    AlreadyActive(String),
    /// The declared environment exists but is not active. Activation itself
    /// happens in the user's shell.
    ActivationPending {
        name: String,
        script: Option<PathBuf>,
    },
    Failed(String),
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Disabled => write!(f, "auto-sync disabled"),
            ReconcileOutcome::NoDeclaration => write!(f, "no environment declared"),
            ReconcileOutcome::MissingEnvironment(name) => {
                write!(f, "declared environment '{}' does not exist", name)
            }
            ReconcileOutcome::AlreadyActive(name) => write!(f, "'{}' already active", name),
            ReconcileOutcome::ActivationPending { name, .. } => {
                write!(f, "'{}' should be activated", name)
            }
            ReconcileOutcome::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

/// Running watcher task and the flag that stops it
pub struct WatcherHandle {
    stopper: WatchStopper,
    task: JoinHandle<()>,
}

/// One `start` call's resources. A run can only be stopped through its own
/// shutdown channel.
struct ActiveRun {
    id: u64,
    shutdown: watch::Sender<bool>,
    watcher: Option<WatcherHandle>,
}

enum DaemonState {
    Stopped,
    Running(ActiveRun),
}

/// Keeps the active environment in line with the project declaration
pub struct ReconciliationDaemon {
    paths: PyspacePaths,
    project_dir: PathBuf,
    store: Arc<EnvironmentStore>,
    cache: Arc<PackageCache>,
    settings: DaemonSettings,
    state: Mutex<DaemonState>,
    runs: AtomicU64,
    status_path: PathBuf,
    status_file: std::sync::Mutex<StatusFile>,
}

impl ReconciliationDaemon {
    pub fn new(
        paths: PyspacePaths,
        project_dir: impl Into<PathBuf>,
        store: Arc<EnvironmentStore>,
        cache: Arc<PackageCache>,
        settings: DaemonSettings,
    ) -> Self {
        let project_dir = project_dir.into();
        Self {
            status_file: std::sync::Mutex::new(StatusFile::new(project_file(&project_dir))),
            status_path: paths.status_file(&project_dir),
            paths,
            project_dir,
            store,
            cache,
            settings,
            state: Mutex::new(DaemonState::Stopped),
            runs: AtomicU64::new(0),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Status file this daemon writes
    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, DaemonState::Running(_))
    }

    /// Run the daemon on the current task until `stop` is called or Ctrl-C
    /// arrives. Returns immediately if the daemon is already running.
    pub async fn start(&self) -> DaemonResult<()> {
        let (run, mut shutdown, mut events) = {
            let mut state = self.state.lock().await;
            if matches!(*state, DaemonState::Running(_)) {
                debug!("Daemon already running");
                return Ok(());
            }

            if let Err(e) = self.record_state(RunState::Running) {
                error!("Reconciliation daemon failed to start: {}", e);
                return Err(e);
            }

            let id = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let (tx, rx) = mpsc::unbounded_channel();
            *state = DaemonState::Running(ActiveRun {
                id,
                shutdown: shutdown_tx,
                watcher: Some(self.spawn_watcher(tx)),
            });
            (id, shutdown_rx, rx)
        };

        info!(project = %self.project_dir.display(), run, "Reconciliation daemon started");
        let result = self.run_loop(&mut shutdown, &mut events).await;
        if let Err(e) = &result {
            error!("Reconciliation daemon failed: {}", e);
        }
        self.shutdown_run(Some(run)).await;
        result
    }

    /// Run `start` on its own task
    pub fn spawn(self: Arc<Self>) -> JoinHandle<DaemonResult<()>> {
        tokio::spawn(async move { self.start().await })
    }

    /// Stop the tick loop and the watcher. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.shutdown_run(None).await;
    }

    /// Stop the current run, or only run `only` when given
    async fn shutdown_run(&self, only: Option<u64>) {
        let ActiveRun {
            shutdown, watcher, ..
        } = {
            let mut state = self.state.lock().await;
            match &*state {
                DaemonState::Running(run) if only.map_or(true, |id| id == run.id) => {}
                _ => return,
            }
            let DaemonState::Running(run) = std::mem::replace(&mut *state, DaemonState::Stopped)
            else {
                return;
            };
            // Recorded under the state lock so a following run's state wins.
            if let Err(e) = self.record_state(RunState::Stopped) {
                warn!("Failed to write daemon status: {}", e);
            }
            run
        };

        shutdown.send_replace(true);

        if let Some(WatcherHandle { stopper, task }) = watcher {
            stopper.stop();
            match tokio::time::timeout(self.settings.join_timeout, task).await {
                Ok(Ok(())) => debug!("File watcher joined"),
                Ok(Err(e)) => warn!("{}", DaemonError::watcher(format!("watcher task ended abnormally: {}", e))),
                Err(_) => warn!(
                    "File watcher did not stop within {:?}; leaving it detached",
                    self.settings.join_timeout
                ),
            }
        }

        info!("Reconciliation daemon stopped");
    }

    /// Compare the declared environment with the active one
    pub async fn reconcile(&self) -> ReconcileOutcome {
        match self.try_reconcile() {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Reconcile failed: {}", e);
                ReconcileOutcome::Failed(e.to_string())
            }
        }
    }

    /// Point-in-time view of the daemon, environments and cache
    pub async fn status(&self) -> DaemonResult<DaemonStatus> {
        Ok(DaemonStatus {
            running: self.is_running().await,
            environment_count: self.store.count()?,
            cache: self.cache.info()?,
        })
    }

    fn try_reconcile(&self) -> PyspaceResult<ReconcileOutcome> {
        let config = PyspaceConfig::load(&self.paths)?;
        if !config.auto_sync {
            debug!("Auto-sync disabled, skipping reconcile");
            return Ok(ReconcileOutcome::Disabled);
        }

        let declared = ProjectDeclaration::load(&self.project_dir)?.and_then(|d| d.environment);
        let Some(name) = declared else {
            return Ok(ReconcileOutcome::NoDeclaration);
        };

        if self.store.get(&name)?.is_none() {
            warn!("Declared environment '{}' does not exist", name);
            return Ok(ReconcileOutcome::MissingEnvironment(name));
        }

        if self.store.is_active(&name) {
            return Ok(ReconcileOutcome::AlreadyActive(name));
        }

        let script = self.store.activation_script(&name);
        info!(
            script = ?script,
            "Environment '{}' is declared but not active", name
        );
        Ok(ReconcileOutcome::ActivationPending { name, script })
    }

    fn spawn_watcher(&self, events: mpsc::UnboundedSender<WatchEvent>) -> WatcherHandle {
        let mut watcher = FileWatcher::new(
            project_file(&self.project_dir),
            self.settings.poll_interval,
            move |event| {
                if events.send(event).is_err() {
                    debug!("Tick loop gone, dropping watch event");
                }
            },
        );
        let stopper = watcher.stop_handle();
        let task = tokio::spawn(async move { watcher.start().await });
        WatcherHandle { stopper, task }
    }

    async fn run_loop(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        events: &mut mpsc::UnboundedReceiver<WatchEvent>,
    ) -> DaemonResult<()> {
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);
        let mut interrupts_armed = self.settings.handle_interrupts;
        let mut events_open = true;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.reconcile_and_record().await?;
                }
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        debug!(path = %event.path.display(), "Project declaration changed");
                        self.reconcile_and_record().await?;
                    }
                    None => {
                        warn!("File watcher exited; continuing with periodic reconcile only");
                        events_open = false;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                result = &mut interrupt, if interrupts_armed => {
                    interrupts_armed = false;
                    match result {
                        Ok(()) => {
                            info!("Interrupt received, shutting down");
                            break;
                        }
                        Err(e) => warn!("{}", DaemonError::service(format!("cannot listen for Ctrl-C: {}", e))),
                    }
                }
            }
        }

        Ok(())
    }

    async fn reconcile_and_record(&self) -> DaemonResult<()> {
        let outcome = self.reconcile().await;
        debug!(%outcome, "Reconcile finished");

        let mut status = self.lock_status();
        status.last_reconcile = Some(Utc::now());
        status.last_outcome = Some(outcome.to_string());
        status.write(&self.status_path)
    }

    fn record_state(&self, state: RunState) -> DaemonResult<()> {
        let mut status = self.lock_status();
        if state == RunState::Running {
            status.started_at = Utc::now();
        }
        status.state = state;
        status.write(&self.status_path)
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, StatusFile> {
        self.status_file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
