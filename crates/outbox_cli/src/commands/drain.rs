//! Drain command implementation.

use super::{CommandResult, Context};
use outbox_engine::SkipReason;

/// Runs one drain if the backend answers the probe.
pub async fn run(ctx: &Context, force: bool) -> CommandResult {
    let engine = ctx.probed_engine().await?;
    if force {
        engine.monitor().report_native(true);
    }

    let report = engine.drain().await;
    match report.skipped {
        Some(SkipReason::Offline) => {
            println!("Backend unreachable, nothing sent (use --force to try anyway)");
        }
        Some(reason) => println!("Drain skipped: {reason:?}"),
        None if report.is_noop() => println!("Nothing to sync"),
        None => {
            println!(
                "Synced {}, will retry {}, evicted {} in {:?}",
                report.synced.len(),
                report.retried.len(),
                report.evicted.len(),
                report.duration
            );
            println!("{} mutation(s) still queued", engine.status().pending_count);
        }
    }
    Ok(())
}
