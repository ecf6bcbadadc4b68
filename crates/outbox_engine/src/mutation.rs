//! Queued mutation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique, opaque identifier of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MutationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Error returned when parsing an operation or entity kind fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what}: {value:?}")]
pub struct ParseKindError {
    what: &'static str,
    value: String,
}

/// The kind of write a mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Creates a new entity.
    Create,
    /// Updates an existing entity.
    Update,
    /// Deletes an existing entity.
    Delete,
}

impl OperationKind {
    /// All operation kinds.
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    /// Returns the wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseKindError {
                what: "operation",
                value: s.to_string(),
            })
    }
}

/// The category of resource a mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A creator profile.
    Creator,
    /// A marketing campaign.
    Campaign,
    /// A content submission made by a creator for a campaign.
    Submission,
    /// A payout issued to a creator.
    Payout,
}

impl EntityKind {
    /// All entity kinds.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Creator,
        EntityKind::Campaign,
        EntityKind::Submission,
        EntityKind::Payout,
    ];

    /// Returns the wire name of the entity kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Creator => "creator",
            EntityKind::Campaign => "campaign",
            EntityKind::Submission => "submission",
            EntityKind::Payout => "payout",
        }
    }

    /// Returns the REST collection segment for this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Creator => "creators",
            EntityKind::Campaign => "campaigns",
            EntityKind::Submission => "submissions",
            EntityKind::Payout => "payouts",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseKindError {
                what: "entity kind",
                value: s.to_string(),
            })
    }
}

/// Lifecycle status of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    /// Waiting for its first dispatch.
    Pending,
    /// Currently being dispatched.
    Syncing,
    /// Applied by the backend.
    Completed,
    /// Last dispatch failed; eligible again next cycle.
    Failed,
}

impl MutationStatus {
    /// Returns true for statuses a drain may pick up.
    pub fn is_retryable_state(&self) -> bool {
        matches!(self, MutationStatus::Pending | MutationStatus::Failed)
    }
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationStatus::Pending => "pending",
            MutationStatus::Syncing => "syncing",
            MutationStatus::Completed => "completed",
            MutationStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Identity of the entity a mutation touches.
///
/// Handed to the cache-invalidation collaborator after a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity id from the payload, if present.
    pub id: Option<String>,
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}/{}", self.kind, id),
            None => write!(f, "{}/*", self.kind),
        }
    }
}

/// Extracts the `id` field of a payload as a string.
///
/// Accepts string and integer ids; anything else counts as missing.
pub fn payload_id(payload: &Value) -> Option<String> {
    match payload.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A write request handed to the engine, before it is given an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMutation {
    /// Operation kind.
    pub operation: OperationKind,
    /// Target entity kind.
    pub entity: EntityKind,
    /// Opaque structured data sent as the request body.
    pub payload: Value,
}

impl NewMutation {
    /// Creates a new mutation request.
    pub fn new(operation: OperationKind, entity: EntityKind, payload: Value) -> Self {
        Self {
            operation,
            entity,
            payload,
        }
    }

    /// Creates a `create` mutation.
    pub fn create(entity: EntityKind, payload: Value) -> Self {
        Self::new(OperationKind::Create, entity, payload)
    }

    /// Creates an `update` mutation.
    pub fn update(entity: EntityKind, payload: Value) -> Self {
        Self::new(OperationKind::Update, entity, payload)
    }

    /// Creates a `delete` mutation.
    pub fn delete(entity: EntityKind, payload: Value) -> Self {
        Self::new(OperationKind::Delete, entity, payload)
    }
}

/// A write operation waiting to be replayed against the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    /// Unique id.
    pub id: MutationId,
    /// When the mutation was queued.
    pub created_at: DateTime<Utc>,
    /// Operation kind.
    pub operation: OperationKind,
    /// Target entity kind.
    pub entity: EntityKind,
    /// Request payload.
    pub payload: Value,
    /// Lifecycle status.
    pub status: MutationStatus,
    /// Number of failed dispatch attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Message of the most recent failure.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueuedMutation {
    /// Builds a fresh `pending` record from a request.
    pub fn from_new(new: NewMutation) -> Self {
        Self {
            id: MutationId::new(),
            created_at: Utc::now(),
            operation: new.operation,
            entity: new.entity,
            payload: new.payload,
            status: MutationStatus::Pending,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Returns the identity of the affected entity.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            kind: self.entity,
            id: payload_id(&self.payload),
        }
    }

    /// Returns true if a drain may dispatch this mutation.
    pub fn is_eligible(&self, max_attempts: u32) -> bool {
        self.status.is_retryable_state() && self.retry_count < max_attempts
    }

    /// Applies a partial update.
    pub fn apply(&mut self, patch: &MutationPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(last_error) = &patch.last_error {
            self.last_error.clone_from(last_error);
        }
    }
}

/// A partial update applied with `QueueStore::update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationPatch {
    /// New status.
    pub status: Option<MutationStatus>,
    /// New retry count.
    pub retry_count: Option<u32>,
    /// New last error (`Some(None)` clears it).
    pub last_error: Option<Option<String>>,
}

impl MutationPatch {
    /// A patch that only changes the status.
    pub fn status(status: MutationStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Sets the retry count.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    /// Sets the last error.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(Some(error.into()));
        self
    }
}
