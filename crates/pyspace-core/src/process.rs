//! External process invocation.
//!
//! Every subprocess pyspace starts (version managers, `python -m venv`, pip)
//! goes through [`CommandRunner`] so that each call carries a bounded timeout
//! and so that tests can substitute scripted runners.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{PyspaceError, PyspaceResult};

/// A program plus its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Override the runner's default timeout for this call
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn requested_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Short tool label used in errors and logs (`pyenv`, `python3`, ...)
    pub fn tool_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .unwrap_or(&self.program)
            .to_string_lossy()
            .into_owned()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A zero-exit output with the given stdout
    pub fn success_with(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A nonzero-exit output with the given stderr
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed stdout of a successful run, if non-empty
    pub fn trimmed_stdout(&self) -> Option<&str> {
        if !self.success() {
            return None;
        }
        let out = self.stdout.trim();
        (!out.is_empty()).then_some(out)
    }
}

/// Runs external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion. A nonzero exit is still `Ok`;
    /// failing to start the program or exceeding the timeout is an error.
    async fn run(&self, invocation: &Invocation) -> PyspaceResult<CommandOutput>;

    /// Run the invocation and treat a nonzero exit as an error
    async fn run_checked(&self, invocation: &Invocation) -> PyspaceResult<CommandOutput> {
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(output)
        } else {
            let detail = output.stderr.trim();
            Err(PyspaceError::external_tool(
                invocation.tool_name(),
                match output.code {
                    Some(code) if detail.is_empty() => format!("exited with status {}", code),
                    Some(code) => format!("exited with status {}: {}", code, detail),
                    None => "terminated by signal".to_string(),
                },
            ))
        }
    }
}

/// Runner backed by real OS processes
#[derive(Debug, Clone)]
pub struct SystemRunner {
    default_timeout: Duration,
}

impl SystemRunner {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> PyspaceResult<CommandOutput> {
        let timeout = invocation.requested_timeout().unwrap_or(self.default_timeout);
        let tool = invocation.tool_name();
        debug!(command = %invocation, ?timeout, "Running external command");

        let mut command = Command::new(invocation.program());
        command
            .args(invocation.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the `output()` future on timeout drops the child, which
        // kills it because of `kill_on_drop`.
        match tokio::time::timeout(timeout, command.output()).await {
            Err(_) => {
                warn!(command = %invocation, "Command timed out after {:?}", timeout);
                Err(PyspaceError::external_tool(
                    tool,
                    format!("timed out after {}s", timeout.as_secs_f64()),
                ))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PyspaceError::external_tool(tool, "command not found"))
            }
            Ok(Err(e)) => Err(PyspaceError::external_tool(tool, e.to_string())),
            Ok(Ok(output)) => Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
        }
    }
}
