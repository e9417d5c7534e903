//! pyspace: named Python environments with a project-aware reconciliation
//! daemon.
//!
//! This crate re-exports the workspace crates under one name.

pub use pyspace_cache as cache;
pub use pyspace_core as core;
pub use pyspace_daemon as daemon;

/// Version of the pyspace system
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
