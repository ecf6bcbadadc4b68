//! List command implementation.

use super::{CommandResult, Context, Format};

/// Runs the list command.
pub fn run(ctx: &Context, format: Format) -> CommandResult {
    let engine = ctx.engine(false)?;
    let mutations = engine.queue().map(|q| q.list()).unwrap_or_default();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&mutations)?),
        Format::Text => {
            if mutations.is_empty() {
                println!("Queue is empty");
            }
            for m in &mutations {
                let entity = m.entity_ref();
                print!(
                    "{}  {}  {:<6} {:<20} {:<9} retries={}",
                    m.id,
                    m.created_at.format("%Y-%m-%d %H:%M:%S"),
                    m.operation,
                    entity,
                    m.status,
                    m.retry_count
                );
                match &m.last_error {
                    Some(error) => println!("  last_error={error}"),
                    None => println!(),
                }
            }
        }
    }
    Ok(())
}
