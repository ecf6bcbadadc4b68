//! Property-based test generators using proptest.
//!
//! Mutations produced here are always dispatchable by the standard route
//! table: the (entity, operation) pair is supported and update/delete
//! payloads carry an `id`.

use outbox_engine::{EntityKind, NewMutation, OperationKind, RouteTable};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for generating entity kinds.
pub fn entity_kind_strategy() -> impl Strategy<Value = EntityKind> {
    prop::sample::select(EntityKind::ALL.to_vec())
}

/// Strategy for generating operation kinds.
pub fn operation_kind_strategy() -> impl Strategy<Value = OperationKind> {
    prop::sample::select(OperationKind::ALL.to_vec())
}

/// Strategy for generating entity ids, including characters that need
/// percent-encoding in a path.
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9][a-z0-9 _/-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating small JSON field maps.
pub fn fields_strategy() -> impl Strategy<Value = serde_json::Map<String, Value>> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            prop::string::string_regex("[a-zA-Z ]{0,12}")
                .expect("Invalid regex")
                .prop_map(Value::from),
        ],
        0..4,
    )
    .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for generating dispatchable mutations.
pub fn new_mutation_strategy() -> impl Strategy<Value = NewMutation> {
    let routes = RouteTable::standard();
    let pairs: Vec<(EntityKind, OperationKind)> = EntityKind::ALL
        .into_iter()
        .flat_map(|entity| OperationKind::ALL.into_iter().map(move |op| (entity, op)))
        .filter(|(entity, op)| routes.supports(*entity, *op))
        .collect();

    (
        prop::sample::select(pairs),
        entity_id_strategy(),
        fields_strategy(),
    )
        .prop_map(|((entity, operation), id, mut fields)| {
            fields.remove("id");
            if operation != OperationKind::Create {
                fields.insert("id".into(), json!(id));
            }
            NewMutation::new(operation, entity, Value::Object(fields))
        })
}

/// Strategy for generating a batch of dispatchable mutations.
pub fn mutation_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<NewMutation>> {
    prop::collection::vec(new_mutation_strategy(), 0..=max_len)
}
