use std::time::Duration;

use anyhow::Result;

use super::Context;
use crate::output::{format_size, format_success};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Clear the whole cache, or with `older_than` only prune stale entries
pub async fn execute(ctx: &Context, older_than: Option<u64>) -> Result<()> {
    if let Some(days) = older_than {
        let removed = ctx.cache.prune(Duration::from_secs(days.saturating_mul(SECS_PER_DAY)))?;
        println!(
            "{}",
            format_success(&format!("Pruned {} packages older than {} days", removed, days))
        );
        return Ok(());
    }

    let before = ctx.cache.info()?;
    ctx.cache.clear()?;
    println!(
        "{}",
        format_success(&format!(
            "Cleared {} cached packages ({})",
            before.total_packages,
            format_size(before.total_size)
        ))
    );
    Ok(())
}
