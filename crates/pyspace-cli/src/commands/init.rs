use anyhow::Result;
use tracing::debug;

use pyspace_core::paths::project_file;
use pyspace_core::{validate_name, ProjectDeclaration};

use super::{report, Context};
use crate::output::{format_info, format_success};

/// Write `pyspace.json` for the current directory
pub async fn execute(ctx: &Context, name: Option<String>) -> Result<()> {
    let file = project_file(&ctx.cwd);
    if file.exists() {
        println!("{}", format_info(&format!("{} already exists", file.display())));
        return Ok(());
    }

    let environment = name.or_else(|| ctx.config.default_env.clone());
    if let Some(env) = &environment {
        if report(validate_name(env))?.is_none() {
            return Ok(());
        }
    }
    debug!(?environment, "Initializing project");

    ProjectDeclaration { environment: environment.clone() }.save(&ctx.cwd)?;
    println!("{}", format_success(&format!("Created {}", file.display())));
    match environment {
        Some(env) if ctx.store.get(&env)?.is_none() => println!(
            "{}",
            format_info(&format!("Environment '{}' does not exist yet; run `pyspace create {}`", env, env))
        ),
        Some(_) => {}
        None => println!(
            "{}",
            format_info("No environment declared; run `pyspace use <name>` to pick one")
        ),
    }
    Ok(())
}
