use std::path::PathBuf;

use anyhow::{bail, Result};

use pyspace_core::paths::project_file;
use pyspace_daemon::{DaemonSettings, ReconciliationDaemon};

use super::Context;
use crate::output::format_info;

/// Run the reconciliation daemon until Ctrl-C
pub async fn execute(ctx: &Context, project: Option<PathBuf>) -> Result<()> {
    let project_dir = project.unwrap_or_else(|| ctx.cwd.clone());
    if !project_dir.is_dir() {
        bail!("project directory {} does not exist", project_dir.display());
    }

    let daemon = ReconciliationDaemon::new(
        ctx.paths.clone(),
        project_dir.clone(),
        ctx.store.clone(),
        ctx.cache.clone(),
        DaemonSettings::default(),
    );
    println!(
        "{}",
        format_info(&format!(
            "Watching {} (Ctrl-C to stop)",
            project_file(&project_dir).display()
        ))
    );
    daemon.start().await?;
    Ok(())
}
