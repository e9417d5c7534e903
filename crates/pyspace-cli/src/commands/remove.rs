use anyhow::Result;

use super::{report, Context};
use crate::output::format_success;

pub async fn execute(ctx: &Context, name: &str) -> Result<()> {
    if report(ctx.store.remove(name))?.is_some() {
        println!("{}", format_success(&format!("Removed environment '{}'", name)));
    }
    Ok(())
}
