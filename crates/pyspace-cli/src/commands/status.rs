use anyhow::Result;

use pyspace_core::current_environment;
use pyspace_daemon::{DaemonSettings, ReconciliationDaemon, StatusFile};

use super::Context;
use crate::output::{format_info, format_size};

pub async fn execute(ctx: &Context) -> Result<()> {
    match current_environment(&ctx.cwd, &ctx.config)? {
        Some(name) => match ctx.store.get(&name)? {
            Some(env) => println!("Current environment: {} (Python {})", env.name, env.version),
            None => println!("Current environment: {} (missing)", name),
        },
        None => println!("Current environment: none"),
    }

    let daemon = ReconciliationDaemon::new(
        ctx.paths.clone(),
        ctx.cwd.clone(),
        ctx.store.clone(),
        ctx.cache.clone(),
        DaemonSettings::default(),
    );
    let snapshot = daemon.status().await?;
    println!("Environments: {}", snapshot.environment_count);
    println!(
        "Cache: {} packages, {} in {}",
        snapshot.cache.total_packages,
        format_size(snapshot.cache.total_size),
        snapshot.cache.cache_dir.display()
    );
    println!("Auto-sync: {}", if ctx.config.auto_sync { "on" } else { "off" });

    match StatusFile::read(daemon.status_path())? {
        Some(file) => {
            println!(
                "Daemon: {:?} (pid {}, watching {}, started {})",
                file.state,
                file.pid,
                file.project_file.display(),
                file.started_at.to_rfc3339()
            );
            if let (Some(at), Some(outcome)) = (file.last_reconcile, file.last_outcome) {
                println!("Last reconcile: {} at {}", outcome, at.to_rfc3339());
            }
        }
        None => println!("{}", format_info("Daemon has never run; start it with `pyspace daemon`")),
    }
    Ok(())
}
