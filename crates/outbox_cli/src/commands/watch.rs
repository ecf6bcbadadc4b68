//! Watch command implementation.

use super::{CommandResult, Context};
use tracing::info;

/// Runs the sync loop until Ctrl-C.
pub async fn run(ctx: &Context) -> CommandResult {
    let engine = ctx.probed_engine().await?;
    info!(
        data_dir = %ctx.data_dir().display(),
        server = %ctx.config.server_url,
        "watching queue, press Ctrl-C to stop"
    );

    let mut updates = engine.watch_status();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().clone();
            info!(
                online = status.online,
                pending = status.pending_count,
                syncing = status.syncing,
                "status"
            );
        }
    });

    engine
        .clone()
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    printer.abort();
    Ok(())
}
