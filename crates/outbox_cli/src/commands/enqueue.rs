//! Enqueue command implementation.

use super::{CommandResult, Context};
use outbox_engine::{EntityKind, NewMutation, OperationKind};
use serde_json::Value;

/// Parses the command arguments into a mutation.
pub fn parse(entity: &str, operation: &str, payload: &str) -> CommandResult<NewMutation> {
    let entity: EntityKind = entity.parse()?;
    let operation: OperationKind = operation.parse()?;
    let payload: Value =
        serde_json::from_str(payload).map_err(|e| format!("payload is not valid JSON: {e}"))?;
    if !payload.is_object() {
        return Err("payload must be a JSON object".into());
    }
    Ok(NewMutation::new(operation, entity, payload))
}

/// Runs the enqueue command. Nothing is sent; use `drain` or `watch`.
pub fn run(ctx: &Context, entity: &str, operation: &str, payload: &str) -> CommandResult {
    let mutation = parse(entity, operation, payload)?;
    let engine = ctx.engine(false)?;
    let queue = engine
        .queue()
        .ok_or("storage unavailable, cannot queue")?;

    let id = queue.enqueue(mutation)?;
    println!("{id}");
    Ok(())
}
