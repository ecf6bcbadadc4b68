//! Sync status projection and user-facing notifications.

use crate::connectivity::{ConnectivityMonitor, ListenerId};
use crate::mutation::{EntityRef, MutationId, OperationKind};
use crate::policy::EvictionReason;
use crate::queue::QueueStore;
use chrono::{DateTime, Utc};
use outbox_storage::KeyValueStore;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Info,
    /// Something completed.
    Success,
    /// Something failed for good.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Error => "error",
        })
    }
}

/// Receives user-facing notifications.
pub trait Notifier: Send + Sync {
    /// Shows one notification.
    fn notify(&self, severity: Severity, message: &str);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, severity: Severity, message: &str) {
        (**self).notify(severity, message);
    }
}

/// [`Notifier`] that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info | Severity::Success => info!(%severity, "{message}"),
            Severity::Error => error!(%severity, "{message}"),
        }
    }
}

/// A notification-worthy event produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A write was queued while offline.
    OfflineQueued {
        /// Mutations waiting after this one was queued.
        pending: usize,
    },
    /// A drain applied at least one mutation.
    BatchSynced {
        /// Number of mutations applied.
        count: usize,
    },
    /// A mutation was evicted.
    PermanentFailure {
        /// Evicted mutation.
        id: MutationId,
        /// Operation of the evicted mutation.
        operation: OperationKind,
        /// Entity the mutation targeted.
        entity: EntityRef,
        /// Last error.
        error: String,
        /// Why it was evicted.
        reason: EvictionReason,
    },
}

impl SyncEvent {
    /// Severity shown to the user.
    pub fn severity(&self) -> Severity {
        match self {
            SyncEvent::OfflineQueued { .. } => Severity::Info,
            SyncEvent::BatchSynced { .. } => Severity::Success,
            SyncEvent::PermanentFailure { .. } => Severity::Error,
        }
    }

    /// Message shown to the user.
    pub fn message(&self) -> String {
        match self {
            SyncEvent::OfflineQueued { pending } => {
                format!("Offline: change saved and will sync when back online ({pending} pending)")
            }
            SyncEvent::BatchSynced { count: 1 } => "Synced 1 queued change".to_string(),
            SyncEvent::BatchSynced { count } => format!("Synced {count} queued changes"),
            SyncEvent::PermanentFailure {
                operation,
                entity,
                error,
                ..
            } => format!("Failed to sync {operation} {entity}: {error}"),
        }
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Whether the backend is considered reachable.
    pub online: bool,
    /// Mutations not yet applied.
    pub pending_count: usize,
    /// Whether a drain is running.
    pub syncing: bool,
    /// End of the last non-empty drain.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Most recent permanent failures, oldest first.
    pub recent_errors: Vec<String>,
}

/// Persisted record written after each non-empty drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    /// End of the last non-empty drain.
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Recent permanent failures, oldest first.
    #[serde(default)]
    pub sync_errors: Vec<String>,
}

#[derive(Debug, Default)]
struct ReporterState {
    syncing: bool,
    last_sync_at: Option<DateTime<Utc>>,
    recent_errors: VecDeque<String>,
}

/// Read-only projection of the sync state plus the notification sink.
pub struct StatusReporter {
    monitor: Arc<ConnectivityMonitor>,
    queue: Option<Arc<QueueStore>>,
    snapshot_store: Option<(Arc<dyn KeyValueStore>, String)>,
    notifier: Arc<dyn Notifier>,
    max_recent_errors: usize,
    state: RwLock<ReporterState>,
    tx: watch::Sender<SyncStatus>,
    listener: Mutex<Option<ListenerId>>,
}

impl StatusReporter {
    /// Creates a reporter with no queue and no persistence.
    pub fn new(
        monitor: Arc<ConnectivityMonitor>,
        notifier: Arc<dyn Notifier>,
        max_recent_errors: usize,
    ) -> Self {
        let (tx, _rx) = watch::channel(SyncStatus {
            online: monitor.current_status(),
            pending_count: 0,
            syncing: false,
            last_sync_at: None,
            recent_errors: Vec::new(),
        });

        Self {
            monitor,
            queue: None,
            snapshot_store: None,
            notifier,
            max_recent_errors,
            state: RwLock::new(ReporterState::default()),
            tx,
            listener: Mutex::new(None),
        }
    }

    /// Derives the pending count from `queue`.
    pub fn with_queue(mut self, queue: Arc<QueueStore>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Loads the snapshot stored under `key` and persists future ones there.
    ///
    /// An unreadable snapshot is ignored with a warning.
    pub fn with_snapshot_store(mut self, store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let snapshot = match store.get(&key) {
            Ok(Some(raw)) => serde_json::from_str::<SyncSnapshot>(&raw).unwrap_or_else(|e| {
                warn!(key = %key, error = %e, "persisted sync snapshot is corrupt, ignoring");
                SyncSnapshot::default()
            }),
            Ok(None) => SyncSnapshot::default(),
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read sync snapshot");
                SyncSnapshot::default()
            }
        };

        {
            let mut state = self.state.write();
            state.last_sync_at = snapshot.last_sync_at;
            state.recent_errors = snapshot.sync_errors.into();
            while state.recent_errors.len() > self.max_recent_errors {
                state.recent_errors.pop_front();
            }
        }
        self.snapshot_store = Some((store, key));
        self
    }

    /// Shares the reporter and keeps its status current on connectivity
    /// changes.
    pub fn into_shared(self) -> Arc<Self> {
        let reporter = Arc::new(self);
        let weak = Arc::downgrade(&reporter);
        let id = reporter.monitor.subscribe(move |_| {
            if let Some(reporter) = weak.upgrade() {
                reporter.refresh();
            }
        });
        *reporter.listener.lock() = Some(id);
        reporter.refresh();
        reporter
    }

    /// Returns the current status.
    pub fn status(&self) -> SyncStatus {
        let state = self.state.read();
        SyncStatus {
            online: self.monitor.current_status(),
            pending_count: self.queue.as_ref().map_or(0, |q| q.pending_count()),
            syncing: state.syncing,
            last_sync_at: state.last_sync_at,
            recent_errors: state.recent_errors.iter().cloned().collect(),
        }
    }

    /// Returns a receiver of status updates.
    pub fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// Republishes the status.
    pub fn refresh(&self) {
        self.tx.send_replace(self.status());
    }

    /// Delivers an event to the notifier.
    ///
    /// A permanent failure also adds one entry to the recent errors.
    pub fn emit(&self, event: SyncEvent) {
        let message = event.message();
        if matches!(event, SyncEvent::PermanentFailure { .. }) {
            self.record_error(message.clone());
        }
        self.notifier.notify(event.severity(), &message);
        self.refresh();
    }

    /// Sets the syncing flag.
    pub fn set_syncing(&self, syncing: bool) {
        self.state.write().syncing = syncing;
        self.refresh();
    }

    /// Records the end of a non-empty drain and persists the snapshot.
    ///
    /// Clears the syncing flag in the same update, so watchers never see a
    /// fresh `last_sync_at` while `syncing` is still set.
    pub fn finish_cycle(&self) {
        let snapshot = {
            let mut state = self.state.write();
            state.syncing = false;
            state.last_sync_at = Some(Utc::now());
            SyncSnapshot {
                last_sync_at: state.last_sync_at,
                sync_errors: state.recent_errors.iter().cloned().collect(),
            }
        };

        if let Some((store, key)) = &self.snapshot_store {
            let result = serde_json::to_string(&snapshot)
                .map_err(|e| e.to_string())
                .and_then(|json| store.set(key, &json).map_err(|e| e.to_string()));
            if let Err(e) = result {
                warn!(key = %key, error = %e, "failed to persist sync snapshot");
            }
        }
        self.refresh();
    }

    fn record_error(&self, message: String) {
        if self.max_recent_errors == 0 {
            return;
        }
        let mut state = self.state.write();
        state.recent_errors.push_back(message);
        while state.recent_errors.len() > self.max_recent_errors {
            state.recent_errors.pop_front();
        }
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        if let Some(id) = self.listener.lock().take() {
            self.monitor.unsubscribe(id);
        }
    }
}

impl fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusReporter")
            .field("status", &self.status())
            .finish()
    }
}
