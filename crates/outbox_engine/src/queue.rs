//! Durable queue of pending mutations.
//!
//! The whole queue is stored as one JSON array under a single key and
//! rewritten after every change. Queues are small (writes made while
//! offline), so a full rewrite keeps the persisted form trivially consistent.

use crate::error::{QueueError, QueueResult};
use crate::mutation::{MutationId, MutationPatch, MutationStatus, NewMutation, QueuedMutation};
use outbox_storage::KeyValueStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered, write-through persisted queue of mutations.
///
/// Insertion order is preserved and is the order in which drains dispatch.
/// Every mutating call persists before it returns.
pub struct QueueStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    entries: Mutex<Vec<QueuedMutation>>,
}

impl QueueStore {
    /// Loads the queue stored under `key`.
    ///
    /// Never fails: a missing, unreadable or unparsable record yields an
    /// empty queue and a warning. Mutations left in `syncing` by an
    /// interrupted drain are reset to `pending`.
    pub fn load(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let mut entries = match store.get(&key) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<QueuedMutation>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(key = %key, error = %e, "persisted queue is corrupt, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read persisted queue, starting empty");
                Vec::new()
            }
        };

        reset_syncing(&mut entries);

        Self {
            store,
            key,
            entries: Mutex::new(entries),
        }
    }

    /// Appends a mutation and returns its id.
    ///
    /// Nothing is queued if the write to storage fails.
    pub fn enqueue(&self, new: NewMutation) -> QueueResult<MutationId> {
        let mutation = QueuedMutation::from_new(new);
        let id = mutation.id;

        let mut entries = self.entries.lock();
        entries.push(mutation);
        if let Err(e) = self.persist(&entries) {
            entries.pop();
            return Err(e);
        }

        debug!(id = %id, queued = entries.len(), "mutation enqueued");
        Ok(id)
    }

    /// Applies a partial update and returns the updated record.
    ///
    /// The in-memory change is kept even if persisting fails, so the running
    /// session never loses track of a mutation's state.
    pub fn update(&self, id: MutationId, patch: &MutationPatch) -> QueueResult<QueuedMutation> {
        let mut entries = self.entries.lock();
        let mutation = entries
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(QueueError::NotFound(id))?;
        mutation.apply(patch);
        let updated = mutation.clone();

        self.persist(&entries)?;
        Ok(updated)
    }

    /// Removes a mutation and returns it.
    pub fn remove(&self, id: MutationId) -> QueueResult<QueuedMutation> {
        let mut entries = self.entries.lock();
        let index = entries
            .iter()
            .position(|m| m.id == id)
            .ok_or(QueueError::NotFound(id))?;
        let removed = entries.remove(index);

        self.persist(&entries)?;
        Ok(removed)
    }

    /// Returns a copy of one mutation.
    pub fn get(&self, id: MutationId) -> Option<QueuedMutation> {
        self.entries.lock().iter().find(|m| m.id == id).cloned()
    }

    /// Returns all mutations in insertion order.
    pub fn list(&self) -> Vec<QueuedMutation> {
        self.entries.lock().clone()
    }

    /// Returns the mutations a drain may dispatch, in insertion order.
    pub fn eligible(&self, max_attempts: u32) -> Vec<QueuedMutation> {
        self.entries
            .lock()
            .iter()
            .filter(|m| m.is_eligible(max_attempts))
            .cloned()
            .collect()
    }

    /// Returns mutations stuck in `syncing` to `pending`.
    ///
    /// Used after a drain was interrupted; returns how many were reset.
    pub fn reset_interrupted(&self) -> QueueResult<usize> {
        let mut entries = self.entries.lock();
        let reset = reset_syncing(&mut entries);
        if reset > 0 {
            self.persist(&entries)?;
        }
        Ok(reset)
    }

    /// Removes every mutation.
    pub fn clear(&self) -> QueueResult<()> {
        let mut entries = self.entries.lock();
        entries.clear();
        self.persist(&entries)
    }

    /// Number of mutations not yet applied.
    pub fn pending_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|m| m.status != MutationStatus::Completed)
            .count()
    }

    /// Number of queued mutations.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn persist(&self, entries: &[QueuedMutation]) -> QueueResult<()> {
        let json = serde_json::to_string(entries)?;
        self.store.set(&self.key, &json)?;
        Ok(())
    }
}

fn reset_syncing(entries: &mut [QueuedMutation]) -> usize {
    let mut reset = 0;
    for mutation in entries
        .iter_mut()
        .filter(|m| m.status == MutationStatus::Syncing)
    {
        debug!(id = %mutation.id, "resetting interrupted mutation to pending");
        mutation.status = MutationStatus::Pending;
        reset += 1;
    }
    reset
}

impl std::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore")
            .field("key", &self.key)
            .field("len", &self.len())
            .finish()
    }
}
