//! Status command implementation.

use super::{CommandResult, Context, Format};
use outbox_engine::SyncStatus;

/// Runs the status command, probing the backend once.
pub async fn run(ctx: &Context, format: Format) -> CommandResult {
    let engine = ctx.probed_engine().await?;
    let status = engine.status();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        Format::Text => print!("{}", render(&status)),
    }
    Ok(())
}

fn render(status: &SyncStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "online:        {}\n",
        if status.online { "yes" } else { "no" }
    ));
    out.push_str(&format!("pending:       {}\n", status.pending_count));
    let last_sync = status
        .last_sync_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    out.push_str(&format!("last sync:     {last_sync}\n"));
    if status.recent_errors.is_empty() {
        out.push_str("recent errors: none\n");
    } else {
        out.push_str("recent errors:\n");
        for error in &status.recent_errors {
            out.push_str(&format!("  - {error}\n"));
        }
    }
    out
}
