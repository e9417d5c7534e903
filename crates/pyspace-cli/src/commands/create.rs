use anyhow::Result;

use pyspace_core::PyspaceError;

use super::{report, Context};
use crate::output::{format_error, format_info, format_success};

/// Create environment `name`
pub async fn execute(ctx: &Context, name: &str, python: Option<String>) -> Result<()> {
    let version = python.unwrap_or_else(|| ctx.config.python_version.clone());
    let created = match ctx.store.create(name, &version).await {
        // A venv build that exits nonzero is a refused create, not a crash.
        Err(e @ PyspaceError::ExternalTool { .. }) => {
            println!("{}", format_error(&e.to_string()));
            return Ok(());
        }
        result => report(result)?,
    };
    let Some(env) = created else {
        return Ok(());
    };

    println!(
        "{}",
        format_success(&format!(
            "Created environment '{}' (Python {}) at {}",
            env.name,
            env.version,
            env.path.display()
        ))
    );
    if let Some(script) = ctx.store.activation_script(name) {
        println!("{}", format_info(&format!("Activate it with: source {}", script.display())));
    }
    Ok(())
}
