use anyhow::Result;

use pyspace_core::ProjectDeclaration;

use super::{missing_environment, report, Context};
use crate::output::{format_info, format_success};

/// Declare `name` as the environment for the current project
pub async fn execute(ctx: &Context, name: &str) -> Result<()> {
    let lookup = ctx
        .store
        .get(name)
        .and_then(|env| env.ok_or_else(|| missing_environment(name)));
    let Some(env) = report(lookup)? else {
        return Ok(());
    };

    ProjectDeclaration::new(name).save(&ctx.cwd)?;
    println!(
        "{}",
        format_success(&format!("Project now uses '{}' (Python {})", env.name, env.version))
    );
    if let Some(script) = ctx.store.activation_script(name) {
        println!("{}", format_info(&format!("Activate it with: source {}", script.display())));
    }
    Ok(())
}
