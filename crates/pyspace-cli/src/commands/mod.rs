//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use pyspace_cache::PackageCache;
use pyspace_core::{
    EnvironmentStore, PyspaceConfig, PyspaceError, PyspacePaths, PyspaceResult, SystemRunner,
};

use crate::output::format_error;

pub mod cache_clear;
pub mod create;
pub mod daemon;
pub mod doctor;
pub mod init;
pub mod install;
pub mod list;
pub mod remove;
pub mod status;
pub mod use_env;

/// Everything a command needs, built once per invocation
pub struct Context {
    pub paths: PyspacePaths,
    pub config: PyspaceConfig,
    pub runner: Arc<SystemRunner>,
    pub store: Arc<EnvironmentStore>,
    pub cache: Arc<PackageCache>,
    /// Project directory for `init`, `use` and `install`
    pub cwd: PathBuf,
}

impl Context {
    /// Resolve the home directory, load the configuration and wire up the
    /// store and cache.
    pub fn load(home: Option<PathBuf>) -> Result<Self> {
        let paths = home.map(PyspacePaths::new).unwrap_or_else(PyspacePaths::from_env);
        let config = PyspaceConfig::load_or_init(&paths)
            .with_context(|| format!("failed to load configuration from {}", paths.root().display()))?;
        let runner = Arc::new(SystemRunner::new(config.command_timeout()));
        let store = EnvironmentStore::from_config(&paths, &config, runner.clone());
        let cache = PackageCache::from_paths(&paths);
        let cwd = std::env::current_dir().context("cannot determine the current directory")?;

        Ok(Self {
            store: Arc::new(store),
            cache: Arc::new(cache),
            runner,
            config,
            paths,
            cwd,
        })
    }
}

/// Print an expected domain failure (missing or duplicate names, bad input)
/// and swallow it; anything else is passed up and ends the process with
/// status 1.
pub(crate) fn report<T>(result: PyspaceResult<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_expected() => {
            println!("{}", format_error(&e.to_string()));
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// The message printed when a named environment does not exist
pub(crate) fn missing_environment(name: &str) -> PyspaceError {
    PyspaceError::not_found(format!("environment '{}'", name))
}
