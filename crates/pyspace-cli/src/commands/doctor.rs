use std::path::Path;

use anyhow::Result;

use pyspace_core::{CommandRunner, Invocation};

use super::Context;
use crate::output::{format_success, format_warning};

/// Report which interpreters and version managers are usable
pub async fn execute(ctx: &Context) -> Result<()> {
    println!("pyspace {}", env!("CARGO_PKG_VERSION"));
    println!("Home: {}", ctx.paths.root().display());

    match ctx.store.resolver().fallback() {
        Some(python) => {
            probe(ctx, python, &["--version"], "Python").await;
            probe(ctx, python, &["-m", "pip", "--version"], "pip").await;
        }
        None => println!("{}", format_warning("no Python interpreter found on PATH")),
    }

    for backend in ctx.store.resolver().backends() {
        match backend.tool_version().await {
            Some(version) => println!("{}", format_success(&version)),
            None => println!("{}", format_warning(&format!("{} not available", backend.name()))),
        }
    }
    Ok(())
}

async fn probe(ctx: &Context, python: &Path, args: &[&str], label: &str) {
    let invocation = Invocation::new(python)
        .args(args)
        .timeout(ctx.config.query_timeout());
    match ctx.runner.run_checked(&invocation).await {
        Ok(output) => {
            // Old interpreters print their version on stderr.
            let text = match output.stdout.trim() {
                "" => output.stderr.trim().to_string(),
                out => out.to_string(),
            };
            println!("{}", format_success(&format!("{}: {}", label, text)));
        }
        Err(e) => println!("{}", format_warning(&format!("{}: {}", label, e))),
    }
}
