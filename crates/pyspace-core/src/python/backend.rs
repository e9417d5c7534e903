//! Version-manager backends.
//!
//! A backend is an external tool that can locate, list and install Python
//! interpreters. Any backend may be missing or broken on a given machine, so
//! every query degrades to `None`/`false`/empty instead of failing.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::process::{CommandRunner, Invocation};

/// An external Python version manager
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionBackend: Send + Sync {
    /// Short name used in logs and diagnostics
    fn name(&self) -> String;

    /// Exact interpreter path for `python<version>`
    async fn which(&self, version: &str) -> Option<PathBuf>;

    /// Interpreter path inside the install prefix of an exact version
    async fn installed_path(&self, _version: &str) -> Option<PathBuf> {
        None
    }

    /// Versions this backend has installed
    async fn installed_versions(&self) -> Vec<String>;

    /// Install `version`, reporting success
    async fn install(&self, version: &str) -> bool;

    /// The backend's own version string, if it is available at all
    async fn tool_version(&self) -> Option<String>;
}

/// Run a backend query and return its trimmed stdout, treating any failure
/// as "backend unavailable".
async fn query(runner: &dyn CommandRunner, backend: &str, invocation: Invocation) -> Option<String> {
    match runner.run(&invocation).await {
        Ok(output) => match output.trimmed_stdout() {
            Some(out) => Some(out.to_string()),
            None => {
                debug!(backend, command = %invocation, code = ?output.code, "Backend query returned nothing");
                None
            }
        },
        Err(e) => {
            debug!(backend, command = %invocation, "Backend unavailable: {}", e);
            None
        }
    }
}

/// Parse `pyenv versions` output.
///
/// Each line is trimmed, a leading `*` active marker is stripped and any
/// annotation after the first token (`(set by ...)`) is discarded.
pub fn parse_version_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim().trim_start_matches('*').trim();
            line.split_whitespace().next().map(str::to_string)
        })
        .collect()
}

/// Parse `uv python list --only-installed` output.
///
/// Lines look like `cpython-3.11.9-linux-x86_64-gnu    /path/to/python`;
/// the version is the second dash-separated field of the first token.
pub fn parse_uv_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|key| key.split('-').nth(1))
        .map(str::to_string)
        .collect()
}

/// Interpreter executable inside an installation prefix
pub fn interpreter_in_prefix(prefix: &Path) -> PathBuf {
    if cfg!(windows) {
        prefix.join("python.exe")
    } else {
        prefix.join("bin").join("python")
    }
}

/// pyenv (https://github.com/pyenv/pyenv)
pub struct PyenvBackend {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    query_timeout: Duration,
    install_timeout: Duration,
}

impl PyenvBackend {
    pub fn new(runner: Arc<dyn CommandRunner>, query_timeout: Duration, install_timeout: Duration) -> Self {
        Self {
            runner,
            program: PathBuf::from("pyenv"),
            query_timeout,
            install_timeout,
        }
    }

    fn invocation(&self) -> Invocation {
        Invocation::new(&self.program).timeout(self.query_timeout)
    }
}

#[async_trait]
impl VersionBackend for PyenvBackend {
    fn name(&self) -> String {
        "pyenv".to_string()
    }

    async fn which(&self, version: &str) -> Option<PathBuf> {
        let inv = self.invocation().arg("which").arg(format!("python{}", version));
        query(self.runner.as_ref(), "pyenv", inv).await.map(PathBuf::from)
    }

    async fn installed_path(&self, version: &str) -> Option<PathBuf> {
        let inv = self.invocation().arg("prefix").arg(version);
        let prefix = query(self.runner.as_ref(), "pyenv", inv).await?;
        Some(interpreter_in_prefix(Path::new(&prefix)))
    }

    async fn installed_versions(&self) -> Vec<String> {
        let inv = self.invocation().arg("versions");
        query(self.runner.as_ref(), "pyenv", inv)
            .await
            .map(|out| parse_version_listing(&out))
            .unwrap_or_default()
    }

    async fn install(&self, version: &str) -> bool {
        info!("Installing Python {} with pyenv", version);
        let inv = Invocation::new(&self.program)
            .arg("install")
            .arg(version)
            .timeout(self.install_timeout);
        match self.runner.run(&inv).await {
            Ok(output) if output.success() => true,
            Ok(output) => {
                warn!("pyenv install {} failed: {}", version, output.stderr.trim());
                false
            }
            Err(e) => {
                warn!("pyenv install {} failed: {}", version, e);
                false
            }
        }
    }

    async fn tool_version(&self) -> Option<String> {
        query(self.runner.as_ref(), "pyenv", self.invocation().arg("--version")).await
    }
}

/// uv's managed interpreters (https://github.com/astral-sh/uv)
pub struct UvBackend {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    query_timeout: Duration,
    install_timeout: Duration,
}

impl UvBackend {
    pub fn new(runner: Arc<dyn CommandRunner>, query_timeout: Duration, install_timeout: Duration) -> Self {
        Self {
            runner,
            program: PathBuf::from("uv"),
            query_timeout,
            install_timeout,
        }
    }

    fn python(&self) -> Invocation {
        Invocation::new(&self.program)
            .arg("python")
            .timeout(self.query_timeout)
    }
}

#[async_trait]
impl VersionBackend for UvBackend {
    fn name(&self) -> String {
        "uv".to_string()
    }

    async fn which(&self, version: &str) -> Option<PathBuf> {
        let inv = self.python().arg("find").arg(version);
        query(self.runner.as_ref(), "uv", inv).await.map(PathBuf::from)
    }

    async fn installed_versions(&self) -> Vec<String> {
        let inv = self.python().args(["list", "--only-installed"]);
        query(self.runner.as_ref(), "uv", inv)
            .await
            .map(|out| parse_uv_listing(&out))
            .unwrap_or_default()
    }

    async fn install(&self, version: &str) -> bool {
        info!("Installing Python {} with uv", version);
        let inv = Invocation::new(&self.program)
            .args(["python", "install"])
            .arg(version)
            .timeout(self.install_timeout);
        match self.runner.run(&inv).await {
            Ok(output) => output.success(),
            Err(e) => {
                warn!("uv python install {} failed: {}", version, e);
                false
            }
        }
    }

    async fn tool_version(&self) -> Option<String> {
        let inv = Invocation::new(&self.program)
            .arg("--version")
            .timeout(self.query_timeout);
        query(self.runner.as_ref(), "uv", inv).await
    }
}
