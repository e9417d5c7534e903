use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use pyspace_cache::PackageCache;
use pyspace_core::{
    EnvironmentStore, InterpreterResolver, ProjectDeclaration, PyspaceConfig, PyspacePaths,
    SystemRunner, VenvBuilder,
};
use pyspace_daemon::{
    DaemonSettings, ReconcileOutcome, ReconciliationDaemon, RunState, StatusFile,
};
use tempfile::{tempdir, TempDir};

struct Fixture {
    _home: TempDir,
    project: TempDir,
    paths: PyspacePaths,
    daemon: Arc<ReconciliationDaemon>,
}

fn fast_settings() -> DaemonSettings {
    DaemonSettings {
        tick_interval: Duration::from_millis(200),
        poll_interval: Duration::from_millis(20),
        join_timeout: Duration::from_millis(500),
        handle_interrupts: false,
    }
}

fn daemon_for(paths: &PyspacePaths, project: &Path, settings: DaemonSettings) -> ReconciliationDaemon {
    let runner = Arc::new(SystemRunner::new(Duration::from_secs(5)));
    let store = EnvironmentStore::new(
        paths,
        InterpreterResolver::new(Vec::new(), None),
        Arc::new(VenvBuilder::new(runner, Duration::from_secs(5))),
    );
    ReconciliationDaemon::new(
        paths.clone(),
        project,
        Arc::new(store),
        Arc::new(PackageCache::from_paths(paths)),
        settings,
    )
}

fn fixture(settings: DaemonSettings) -> Fixture {
    let home = tempdir().unwrap();
    let project = tempdir().unwrap();
    let paths = PyspacePaths::new(home.path());
    let daemon = daemon_for(&paths, project.path(), settings);

    Fixture {
        _home: home,
        project,
        paths,
        daemon: Arc::new(daemon),
    }
}

impl Fixture {
    fn status(&self) -> Option<StatusFile> {
        StatusFile::read(&self.paths.status_file(self.project.path())).unwrap()
    }
}

fn make_env(paths: &PyspacePaths, name: &str) {
    std::fs::create_dir_all(paths.envs_dir().join(name).join("bin")).unwrap();
}

fn bump_mtime(path: &Path) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(10))
        .unwrap();
}

#[tokio::test]
async fn test_reconcile_without_declaration() {
    let fx = fixture(fast_settings());
    assert_eq!(fx.daemon.reconcile().await, ReconcileOutcome::NoDeclaration);

    std::fs::write(fx.project.path().join("pyspace.json"), "{}").unwrap();
    assert_eq!(fx.daemon.reconcile().await, ReconcileOutcome::NoDeclaration);
}

#[tokio::test]
async fn test_reconcile_missing_environment() {
    let fx = fixture(fast_settings());
    ProjectDeclaration::new("demo").save(fx.project.path()).unwrap();
    assert_eq!(
        fx.daemon.reconcile().await,
        ReconcileOutcome::MissingEnvironment("demo".to_string())
    );
}

#[tokio::test]
async fn test_reconcile_existing_environment_is_pending() {
    let fx = fixture(fast_settings());
    make_env(&fx.paths, "demo");
    ProjectDeclaration::new("demo").save(fx.project.path()).unwrap();

    match fx.daemon.reconcile().await {
        ReconcileOutcome::ActivationPending { name, script } => {
            assert_eq!(name, "demo");
            assert!(script.unwrap().starts_with(fx.paths.envs_dir().join("demo")));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_reconcile_disabled_by_config() {
    let fx = fixture(fast_settings());
    make_env(&fx.paths, "demo");
    ProjectDeclaration::new("demo").save(fx.project.path()).unwrap();

    PyspaceConfig {
        auto_sync: false,
        ..PyspaceConfig::default()
    }
    .save(&fx.paths)
    .unwrap();

    assert_eq!(fx.daemon.reconcile().await, ReconcileOutcome::Disabled);
}

#[tokio::test]
async fn test_reconcile_failure_is_reported() {
    let fx = fixture(fast_settings());
    std::fs::write(fx.project.path().join("pyspace.json"), "{broken").unwrap();
    assert!(matches!(fx.daemon.reconcile().await, ReconcileOutcome::Failed(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_stop_within_bound() {
    let settings = fast_settings();
    let bound = settings.tick_interval + settings.join_timeout;
    let fx = fixture(settings);

    let handle = fx.daemon.clone().spawn();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.daemon.is_running().await);

    let started = Instant::now();
    fx.daemon.stop().await;
    tokio::time::timeout(bound, handle)
        .await
        .expect("daemon loop should exit")
        .unwrap()
        .unwrap();

    assert!(started.elapsed() <= bound);
    assert!(!fx.daemon.is_running().await);

    let status = fx.status().unwrap();
    assert_eq!(status.state, RunState::Stopped);
    assert_eq!(status.last_outcome.as_deref(), Some("no environment declared"));

    // Stopping again is harmless.
    fx.daemon.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_start_is_noop() {
    let fx = fixture(fast_settings());
    let handle = fx.daemon.clone().spawn();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_millis(100), fx.daemon.start())
        .await
        .expect("start on a running daemon returns at once")
        .unwrap();
    assert!(fx.daemon.is_running().await);

    fx.daemon.stop().await;
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_declaration_change_triggers_reconcile() {
    let settings = DaemonSettings {
        tick_interval: Duration::from_secs(60),
        ..fast_settings()
    };
    let fx = fixture(settings);
    make_env(&fx.paths, "demo");
    let declaration = fx.project.path().join("pyspace.json");
    std::fs::write(&declaration, "{}").unwrap();

    let handle = fx.daemon.clone().spawn();
    // Let the first tick run and the watcher record its baseline.
    tokio::time::sleep(Duration::from_millis(100)).await;

    ProjectDeclaration::new("demo").save(fx.project.path()).unwrap();
    bump_mtime(&declaration);

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut outcome = None;
    while Instant::now() < deadline {
        outcome = fx.status().and_then(|s| s.last_outcome);
        if outcome.as_deref() == Some("'demo' should be activated") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(outcome.as_deref(), Some("'demo' should be activated"));

    fx.daemon.stop().await;
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_status_snapshot() {
    let fx = fixture(fast_settings());
    make_env(&fx.paths, "one");
    make_env(&fx.paths, "two");

    let status = fx.daemon.status().await.unwrap();
    assert!(!status.running);
    assert_eq!(status.environment_count, 2);
    assert_eq!(status.cache.total_packages, 0);
    assert_eq!(status.cache.cache_dir, fx.paths.cache_dir());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_does_not_wait_for_sleeping_watcher() {
    let settings = DaemonSettings {
        poll_interval: Duration::from_secs(10),
        join_timeout: Duration::from_millis(50),
        ..fast_settings()
    };
    let fx = fixture(settings);

    let handle = fx.daemon.clone().spawn();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.daemon.is_running().await);

    let started = Instant::now();
    fx.daemon.stop().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!fx.daemon.is_running().await);

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("daemon loop should exit")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_start_fails_when_home_is_unwritable() {
    let dir = tempdir().unwrap();
    let project = tempdir().unwrap();
    let home = dir.path().join("home");
    std::fs::write(&home, "not a directory").unwrap();

    let daemon = daemon_for(&PyspacePaths::new(&home), project.path(), fast_settings());
    let result = tokio::time::timeout(Duration::from_secs(1), daemon.start())
        .await
        .expect("start should not hang");
    assert!(result.is_err());
    assert!(!daemon.is_running().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_write_failure_stops_daemon() {
    let fx = fixture(fast_settings());
    let handle = fx.daemon.clone().spawn();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.daemon.is_running().await);

    let status_dir = fx.daemon.status_path().parent().unwrap().to_path_buf();
    std::fs::remove_dir_all(&status_dir).unwrap();
    std::fs::write(&status_dir, "blocks the status directory").unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("daemon loop should end on the next tick")
        .unwrap();
    assert!(result.is_err());
    assert!(!fx.daemon.is_running().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_survives_previous_run_exit() {
    let fx = fixture(fast_settings());

    let first = fx.daemon.clone().spawn();
    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.daemon.stop().await;

    let second = fx.daemon.clone().spawn();
    first.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fx.daemon.is_running().await);
    assert_eq!(fx.status().unwrap().state, RunState::Running);

    fx.daemon.stop().await;
    second.await.unwrap().unwrap();
    assert_eq!(fx.status().unwrap().state, RunState::Stopped);
}

#[tokio::test]
async fn test_daemons_for_different_projects_keep_separate_status() {
    let fx = fixture(fast_settings());
    let other = tempdir().unwrap();
    let other_daemon = daemon_for(&fx.paths, other.path(), fast_settings());

    assert_ne!(fx.daemon.status_path(), other_daemon.status_path());
    assert_eq!(
        fx.daemon.status_path(),
        fx.paths.status_file(fx.project.path()).as_path()
    );
}
