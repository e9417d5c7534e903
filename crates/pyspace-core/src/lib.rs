//! Core types for the pyspace Python environment manager.
//!
//! This crate owns the on-disk layout, layered configuration, interpreter
//! resolution and the environment store used by the CLI and the daemon.

pub mod config;
pub mod environment;
pub mod error;
pub mod paths;
pub mod process;
pub mod python;
pub mod utils;

// Re-export commonly used types
pub use crate::config::{current_environment, PyspaceConfig, ProjectDeclaration};
pub use crate::environment::{
    pip_install, validate_name, Environment, EnvironmentBuilder, EnvironmentInfo,
    EnvironmentRecord, EnvironmentStore, VenvBuilder,
};
pub use crate::error::{PyspaceError, PyspaceResult};
pub use crate::paths::PyspacePaths;
pub use crate::process::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use crate::python::{
    is_full_version, system_interpreter, validate_version, InterpreterResolver, VersionBackend,
};
