use std::path::PathBuf;

use anyhow::Result;
use tracing::warn;

use pyspace_cache::split_requirement;
use pyspace_core::{current_environment, pip_install};

use super::{missing_environment, report, Context};
use crate::output::{format_error, format_success, format_warning};

/// Install `package` into the current environment, or the system interpreter
/// with `--global`. Artifacts are downloaded into the cache first so later
/// installs can reuse them.
pub async fn execute(ctx: &Context, package: &str, global: bool) -> Result<()> {
    let Some(python) = target_interpreter(ctx, global)? else {
        return Ok(());
    };
    let timeout = ctx.config.command_timeout();

    let cached = match ctx
        .cache
        .download(ctx.runner.as_ref(), &python, package, timeout)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!("Caching {} failed: {}", package, e);
            println!("{}", format_warning(&format!("could not cache {}, installing directly", package)));
            false
        }
    };

    let find_links = ctx.cache.dir().is_dir().then(|| ctx.cache.dir());
    pip_install(ctx.runner.as_ref(), &python, package, find_links, timeout).await?;

    if cached {
        let (name, version) = split_requirement(package);
        ctx.cache.record(name, version)?;
    }

    println!(
        "{}",
        format_success(&format!("Installed {} with {}", package, python.display()))
    );
    Ok(())
}

fn target_interpreter(ctx: &Context, global: bool) -> Result<Option<PathBuf>> {
    if global {
        return Ok(match ctx.store.resolver().fallback() {
            Some(python) => Some(python.to_path_buf()),
            None => {
                println!("{}", format_error("no system Python interpreter found"));
                None
            }
        });
    }

    let Some(name) = current_environment(&ctx.cwd, &ctx.config)? else {
        println!(
            "{}",
            format_error("no environment selected; run `pyspace use <name>` or set default_env")
        );
        return Ok(None);
    };
    report(
        ctx.store
            .python_executable(&name)
            .ok_or_else(|| missing_environment(&name)),
    )
}
