use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pyspace_core::environment::EnvironmentRecord;
use pyspace_core::{
    EnvironmentBuilder, EnvironmentStore, InterpreterResolver, PyspaceError, PyspacePaths,
    PyspaceResult,
};
use std::collections::BTreeMap;
use tempfile::tempdir;

const FALLBACK: &str = "/opt/fallback/bin/python3";

/// Builder that lays out a venv-like tree and remembers which interpreter
/// it was handed.
#[derive(Default)]
struct StubBuilder {
    fail: bool,
    seen: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl EnvironmentBuilder for StubBuilder {
    async fn build(&self, python: &Path, target: &Path) -> PyspaceResult<()> {
        self.seen.lock().unwrap().push(python.to_path_buf());
        if self.fail {
            std::fs::create_dir_all(target)?;
            return Err(PyspaceError::external_tool("python3", "exited with status 1"));
        }
        std::fs::create_dir_all(target.join("bin"))?;
        std::fs::write(target.join("bin").join("activate"), "# activate\n")?;
        Ok(())
    }
}

fn setup(root: &Path, builder: Arc<StubBuilder>) -> EnvironmentStore {
    let resolver = InterpreterResolver::new(Vec::new(), Some(PathBuf::from(FALLBACK)));
    EnvironmentStore::new(&PyspacePaths::new(root), resolver, builder)
}

fn registry(root: &Path) -> BTreeMap<String, EnvironmentRecord> {
    let contents = std::fs::read_to_string(root.join("metadata.json")).unwrap();
    serde_json::from_str(&contents).unwrap()
}

#[tokio::test]
async fn test_create_demo_scenario() {
    let dir = tempdir().unwrap();
    let builder = Arc::new(StubBuilder::default());
    let store = setup(dir.path(), builder.clone());

    let env = store.create("demo", "3.11.0").await.unwrap();
    assert_eq!(env.name, "demo");
    assert_eq!(env.path, dir.path().join("envs").join("demo"));
    assert_eq!(builder.seen.lock().unwrap().as_slice(), &[PathBuf::from(FALLBACK)]);

    let registry = registry(dir.path());
    assert_eq!(registry.len(), 1);
    assert_eq!(registry["demo"].version, "3.11.0");
    assert_eq!(registry["demo"].path, dir.path().join("envs").join("demo"));

    let envs = store.list().unwrap();
    assert_eq!(envs.len(), 1);
    assert_eq!(envs[0].name, "demo");
    assert_eq!(envs[0].version, "3.11.0");
    assert!(!envs[0].active);
    assert!(!store.is_active("demo"));

    assert_eq!(
        store.activation_script("demo").unwrap(),
        env.path.join("bin").join("activate")
    );
}

#[tokio::test]
async fn test_create_twice_keeps_one_entry() {
    let dir = tempdir().unwrap();
    let builder = Arc::new(StubBuilder::default());
    let store = setup(dir.path(), builder.clone());

    store.create("demo", "3.11").await.unwrap();
    let second = store.create("demo", "3.12").await;
    assert!(matches!(second, Err(PyspaceError::AlreadyExists(_))));

    // The second attempt never reached the builder.
    assert_eq!(builder.seen.lock().unwrap().len(), 1);
    let registry = registry(dir.path());
    assert_eq!(registry.len(), 1);
    assert_eq!(registry["demo"].version, "3.11");
}

#[tokio::test]
async fn test_create_then_remove_leaves_nothing() {
    let dir = tempdir().unwrap();
    let store = setup(dir.path(), Arc::new(StubBuilder::default()));

    for name in ["a", "b.c", "d_e-f"] {
        let env = store.create(name, "3.10.2").await.unwrap();
        store.remove(name).unwrap();

        assert!(!env.path.exists());
        assert!(!registry(dir.path()).contains_key(name));
        assert!(store.get(name).unwrap().is_none());
    }
    assert!(store.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_missing_is_not_found() {
    let dir = tempdir().unwrap();
    let store = setup(dir.path(), Arc::new(StubBuilder::default()));
    assert!(matches!(store.remove("ghost"), Err(PyspaceError::NotFound(_))));
    assert!(!dir.path().join("metadata.json").exists());
}

#[tokio::test]
async fn test_builder_failure_writes_no_metadata() {
    let dir = tempdir().unwrap();
    let builder = Arc::new(StubBuilder {
        fail: true,
        ..StubBuilder::default()
    });
    let store = setup(dir.path(), builder);

    let result = store.create("broken", "3.11").await;
    assert!(matches!(result, Err(PyspaceError::ExternalTool { .. })));
    assert!(!dir.path().join("metadata.json").exists());
}

#[tokio::test]
async fn test_no_interpreter_is_not_found() {
    let dir = tempdir().unwrap();
    let builder = Arc::new(StubBuilder::default());
    let resolver = InterpreterResolver::new(Vec::new(), None);
    let store = EnvironmentStore::new(&PyspacePaths::new(dir.path()), resolver, builder.clone());

    let result = store.create("demo", "3.11").await;
    assert!(matches!(result, Err(PyspaceError::NotFound(_))));
    assert!(builder.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_backends_fall_back_for_any_valid_version() {
    let resolver = InterpreterResolver::new(Vec::new(), Some(PathBuf::from(FALLBACK)));
    for version in ["3", "3.8", "3.11.4", "4.0.0"] {
        assert_eq!(resolver.resolve(version).await, Some(PathBuf::from(FALLBACK)));
    }
}

#[tokio::test]
async fn test_concurrent_creates_keep_every_entry() {
    let dir = tempdir().unwrap();
    let store = Arc::new(setup(dir.path(), Arc::new(StubBuilder::default())));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.create(&format!("env{}", i), "3.11").await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(registry(dir.path()).len(), 8);
    assert_eq!(store.count().unwrap(), 8);
}
