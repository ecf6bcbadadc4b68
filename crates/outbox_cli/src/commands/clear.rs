//! Clear command implementation.

use super::{CommandResult, Context};

/// Drops every queued mutation.
pub fn run(ctx: &Context, yes: bool) -> CommandResult {
    let engine = ctx.engine(false)?;
    let count = engine.queue().map_or(0, |q| q.len());

    if !yes {
        println!("{count} mutation(s) would be dropped; pass --yes to confirm");
        return Ok(());
    }

    engine.clear_queue()?;
    println!("Dropped {count} mutation(s)");
    Ok(())
}
