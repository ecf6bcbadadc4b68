//! Test fixtures and engine helpers.
//!
//! Provides recording collaborators and a ready-made engine wired to a
//! [`FakeBackend`].

use crate::backend::FakeBackend;
use outbox_engine::{
    CacheInvalidator, EntityRef, LoopbackClient, Notifier, Severity, SyncConfig, SyncEngine,
};
use outbox_storage::{FileStore, InMemoryStore, KeyValueStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// The engine type used by the fixtures.
pub type TestSyncEngine = SyncEngine<LoopbackClient<Arc<FakeBackend>>>;

/// A [`Notifier`] that remembers every notification.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    entries: Mutex<Vec<(Severity, String)>>,
}

impl RecordingNotifier {
    /// All notifications in order.
    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries.lock().clone()
    }

    /// Number of notifications with the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|(s, _)| *s == severity)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        self.entries.lock().push((severity, message.to_string()));
    }
}

/// A [`CacheInvalidator`] that remembers every invalidated entity.
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    entities: Mutex<Vec<EntityRef>>,
}

impl RecordingInvalidator {
    /// Invalidated entities in order.
    pub fn entities(&self) -> Vec<EntityRef> {
        self.entities.lock().clone()
    }

    /// Invalidated entities rendered as `kind/id`.
    pub fn rendered(&self) -> Vec<String> {
        self.entities.lock().iter().map(ToString::to_string).collect()
    }
}

impl CacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, entity: &EntityRef) {
        self.entities.lock().push(entity.clone());
    }
}

/// Configuration for tests: no probe, no pause between dispatches.
pub fn test_config() -> SyncConfig {
    SyncConfig::new("http://backend.test")
        .without_probe()
        .with_inter_mutation_delay(Duration::ZERO)
}

/// An engine wired to a fake backend and recording collaborators.
pub struct TestEngine {
    /// The engine.
    pub engine: Arc<TestSyncEngine>,
    /// The fake backend.
    pub backend: Arc<FakeBackend>,
    /// The storage the engine persists to.
    pub store: Arc<dyn KeyValueStore>,
    /// Recorded notifications.
    pub notifier: Arc<RecordingNotifier>,
    /// Recorded invalidations.
    pub invalidator: Arc<RecordingInvalidator>,
}

impl TestEngine {
    /// An engine over fresh in-memory storage.
    pub fn new(online: bool) -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()), online)
    }

    /// An engine that starts offline.
    pub fn offline() -> Self {
        Self::new(false)
    }

    /// An engine that starts online.
    pub fn online() -> Self {
        Self::new(true)
    }

    /// An engine over the given storage.
    pub fn with_store(store: Arc<dyn KeyValueStore>, online: bool) -> Self {
        Self::build(test_config(), store, Arc::new(FakeBackend::new()), online)
    }

    /// An engine with every part supplied by the caller.
    pub fn build(
        config: SyncConfig,
        store: Arc<dyn KeyValueStore>,
        backend: Arc<FakeBackend>,
        online: bool,
    ) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let invalidator = Arc::new(RecordingInvalidator::default());
        let engine = SyncEngine::builder(config, Arc::new(LoopbackClient::new(backend.clone())))
            .with_storage(store.clone())
            .with_notifier(notifier.clone())
            .with_invalidator(invalidator.clone())
            .initially_online(online)
            .build();

        Self {
            engine: Arc::new(engine),
            backend,
            store,
            notifier,
            invalidator,
        }
    }

    /// Builds a second engine over the same storage and backend, as after a
    /// restart.
    pub fn restart(&self, online: bool) -> Self {
        Self::build(
            self.engine.config().clone(),
            self.store.clone(),
            self.backend.clone(),
            online,
        )
    }

    /// Marks the backend reachable.
    pub fn go_online(&self) {
        self.engine.monitor().report_native(true);
    }

    /// Marks the backend unreachable.
    pub fn go_offline(&self) {
        self.engine.monitor().report_native(false);
    }
}

/// A file-backed store in a temporary directory.
///
/// The directory is removed when the returned guard is dropped.
pub fn temp_file_store() -> (Arc<FileStore>, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = FileStore::open(dir.path()).expect("Failed to open file store");
    (Arc::new(store), dir)
}
