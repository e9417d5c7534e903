use anyhow::Result;

use super::Context;
use crate::output::{format_environment, format_info};

pub async fn execute(ctx: &Context) -> Result<()> {
    let envs = ctx.store.list()?;
    if envs.is_empty() {
        println!("{}", format_info("No environments found"));
        return Ok(());
    }

    println!("Environments in {}:", ctx.store.base_dir().display());
    for env in &envs {
        println!("{}", format_environment(env));
    }
    Ok(())
}
