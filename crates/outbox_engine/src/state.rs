//! Sync engine state machine.
//!
//! One drain is `Idle → Draining → Idle`. The engine owns the queue, the
//! dispatcher and the status reporter; the connectivity monitor is shared
//! with whoever reports native events.

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::dispatcher::{DispatchOutcome, Dispatcher, RouteTable};
use crate::error::{QueueError, SyncResult};
use crate::http::{HttpClient, ReqwestClient};
use crate::mutation::{
    EntityRef, MutationId, MutationPatch, MutationStatus, NewMutation, QueuedMutation,
};
use crate::policy::{self, Transition};
use crate::queue::QueueStore;
use crate::status::{Notifier, StatusReporter, SyncEvent, SyncStatus, TracingNotifier};
use outbox_storage::KeyValueStore;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No drain is running.
    Idle,
    /// A drain is dispatching mutations.
    Draining,
}

impl SyncState {
    /// Returns true while a drain is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Draining)
    }
}

/// Statistics about drains since the engine was built.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Drains that processed at least one mutation.
    pub drains_completed: u64,
    /// Mutations applied by the backend.
    pub mutations_synced: u64,
    /// Failed attempts that will be retried.
    pub mutations_retried: u64,
    /// Mutations evicted.
    pub mutations_evicted: u64,
    /// End of the last non-empty drain.
    pub last_drain: Option<Instant>,
}

/// Why a drain did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another drain is running.
    InFlight,
    /// The backend is considered unreachable.
    Offline,
    /// The engine has no durable storage and therefore no queue.
    DispatchOnly,
}

/// Result of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Mutations applied and removed, in dispatch order.
    pub synced: Vec<MutationId>,
    /// Mutations that failed and stay queued.
    pub retried: Vec<MutationId>,
    /// Mutations evicted.
    pub evicted: Vec<MutationId>,
    /// Set when the drain did not run.
    pub skipped: Option<SkipReason>,
    /// Wall time of the drain.
    pub duration: Duration,
}

impl DrainReport {
    /// A report for a drain that did not run.
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// Number of mutations dispatched.
    pub fn processed(&self) -> usize {
        self.synced.len() + self.retried.len() + self.evicted.len()
    }

    /// Returns true if nothing was dispatched.
    pub fn is_noop(&self) -> bool {
        self.processed() == 0
    }
}

/// What [`SyncEngine::submit`] did with a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Queued for the next drain.
    Queued(MutationId),
    /// Sent immediately (no durable storage).
    Dispatched(DispatchOutcome),
}

/// Marks cached reads of an entity stale.
pub trait CacheInvalidator: Send + Sync {
    /// Called once per mutation the backend applied.
    fn invalidate(&self, entity: &EntityRef);
}

impl<I: CacheInvalidator + ?Sized> CacheInvalidator for Arc<I> {
    fn invalidate(&self, entity: &EntityRef) {
        (**self).invalidate(entity);
    }
}

/// [`CacheInvalidator`] that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate(&self, _entity: &EntityRef) {}
}

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder<C: HttpClient> {
    config: SyncConfig,
    client: Arc<C>,
    storage: Option<Arc<dyn KeyValueStore>>,
    routes: RouteTable,
    notifier: Arc<dyn Notifier>,
    invalidator: Arc<dyn CacheInvalidator>,
    monitor: Option<Arc<ConnectivityMonitor>>,
    initially_online: bool,
}

impl<C: HttpClient> SyncEngineBuilder<C> {
    /// Sets the durable storage. Without it the engine is dispatch-only.
    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the route table.
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// Sets the notification sink.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Sets the cache-invalidation collaborator.
    pub fn with_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    /// Uses an existing connectivity monitor.
    pub fn with_monitor(mut self, monitor: Arc<ConnectivityMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Sets the initial connectivity of a monitor created by the builder.
    pub fn initially_online(mut self, online: bool) -> Self {
        self.initially_online = online;
        self
    }

    /// Builds the engine, loading the persisted queue if storage is usable.
    pub fn build(self) -> SyncEngine<C> {
        let storage = self
            .storage
            .filter(|store| storage_available(store.as_ref(), &self.config.probe_key()));
        if storage.is_none() {
            warn!("durable storage unavailable, running in dispatch-only mode");
        }

        let monitor = self
            .monitor
            .unwrap_or_else(|| Arc::new(ConnectivityMonitor::new(self.initially_online)));

        let queue = storage
            .as_ref()
            .map(|store| Arc::new(QueueStore::load(store.clone(), self.config.queue_key())));

        let mut reporter = StatusReporter::new(
            monitor.clone(),
            self.notifier,
            self.config.max_recent_errors,
        );
        if let Some(queue) = &queue {
            reporter = reporter.with_queue(queue.clone());
        }
        if let Some(store) = storage {
            reporter = reporter.with_snapshot_store(store, self.config.snapshot_key());
        }

        SyncEngine {
            dispatcher: Dispatcher::new(self.client, self.routes),
            queue,
            monitor,
            reporter: reporter.into_shared(),
            invalidator: self.invalidator,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            in_flight: AtomicBool::new(false),
            trigger: Notify::new(),
            config: self.config,
        }
    }
}

fn storage_available(store: &dyn KeyValueStore, probe_key: &str) -> bool {
    match store.set(probe_key, "1").and_then(|_| store.remove(probe_key)) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "storage check failed");
            false
        }
    }
}

/// The sync engine replays queued mutations against the backend.
pub struct SyncEngine<C: HttpClient> {
    config: SyncConfig,
    dispatcher: Dispatcher<C>,
    queue: Option<Arc<QueueStore>>,
    monitor: Arc<ConnectivityMonitor>,
    reporter: Arc<StatusReporter>,
    invalidator: Arc<dyn CacheInvalidator>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    in_flight: AtomicBool,
    trigger: Notify,
}

impl SyncEngine<ReqwestClient> {
    /// Starts a builder that talks to `config.server_url` over HTTP.
    pub fn connect(config: SyncConfig) -> SyncResult<SyncEngineBuilder<ReqwestClient>> {
        let mut client = ReqwestClient::new(config.server_url.clone(), config.timeout)?;
        if let Some(token) = &config.auth_token {
            client = client.with_auth_token(token.clone());
        }
        Ok(Self::builder(config, Arc::new(client)))
    }
}

impl<C: HttpClient> SyncEngine<C> {
    /// Starts a builder.
    pub fn builder(config: SyncConfig, client: Arc<C>) -> SyncEngineBuilder<C> {
        SyncEngineBuilder {
            config,
            client,
            storage: None,
            routes: RouteTable::standard(),
            notifier: Arc::new(TracingNotifier),
            invalidator: Arc::new(NoopInvalidator),
            monitor: None,
            initially_online: true,
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Gets the queue; `None` in dispatch-only mode.
    pub fn queue(&self) -> Option<&Arc<QueueStore>> {
        self.queue.as_ref()
    }

    /// Returns true if the engine has no durable queue.
    pub fn is_dispatch_only(&self) -> bool {
        self.queue.is_none()
    }

    /// Gets the connectivity monitor.
    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    /// Gets the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    /// Returns the current sync status.
    pub fn status(&self) -> SyncStatus {
        self.reporter.status()
    }

    /// Returns a receiver of status updates.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.reporter.watch()
    }

    /// Accepts a write from the application.
    ///
    /// Queues it when durable storage is available, notifying the user if
    /// offline and waking the sync loop if online. Without storage the
    /// mutation is sent immediately and a failure is returned to the caller.
    pub async fn submit(&self, new: NewMutation) -> SyncResult<Submission> {
        let Some(queue) = &self.queue else {
            let mutation = QueuedMutation::from_new(new);
            let outcome = self.dispatcher.dispatch(&mutation).await?;
            self.invalidator.invalidate(&mutation.entity_ref());
            return Ok(Submission::Dispatched(outcome));
        };

        let id = queue.enqueue(new)?;
        if self.monitor.current_status() {
            self.reporter.refresh();
            self.trigger_sync();
        } else {
            self.reporter.emit(SyncEvent::OfflineQueued {
                pending: queue.pending_count(),
            });
        }
        Ok(Submission::Queued(id))
    }

    /// Removes every queued mutation.
    pub fn clear_queue(&self) -> SyncResult<()> {
        if let Some(queue) = &self.queue {
            queue.clear()?;
            self.reporter.refresh();
        }
        Ok(())
    }

    /// Wakes the running sync loop.
    pub fn trigger_sync(&self) {
        self.trigger.notify_one();
    }

    /// Runs one drain.
    ///
    /// Every eligible mutation is dispatched once, in queue order. Failures
    /// are recorded on the mutation and never returned.
    pub async fn drain(&self) -> DrainReport {
        let Some(queue) = &self.queue else {
            return DrainReport::skipped(SkipReason::DispatchOnly);
        };
        if !self.monitor.current_status() {
            debug!("offline, skipping drain");
            return DrainReport::skipped(SkipReason::Offline);
        }
        let Some(_guard) = DrainGuard::acquire(self, queue) else {
            debug!("drain already in flight");
            return DrainReport::skipped(SkipReason::InFlight);
        };

        let eligible = queue.eligible(self.config.retry.max_attempts);
        if eligible.is_empty() {
            return DrainReport::default();
        }

        let start = Instant::now();
        self.set_state(SyncState::Draining);
        self.reporter.set_syncing(true);
        debug!(eligible = eligible.len(), "drain started");

        let mut report = DrainReport::default();
        for (index, mutation) in eligible.iter().enumerate() {
            if index > 0 && !self.config.inter_mutation_delay.is_zero() {
                tokio::time::sleep(self.config.inter_mutation_delay).await;
            }
            self.process(queue, mutation, &mut report).await;
        }
        report.duration = start.elapsed();

        if !report.synced.is_empty() {
            self.reporter.emit(SyncEvent::BatchSynced {
                count: report.synced.len(),
            });
        }
        self.set_state(SyncState::Idle);
        self.reporter.finish_cycle();

        {
            let mut stats = self.stats.write();
            stats.drains_completed += 1;
            stats.mutations_synced += report.synced.len() as u64;
            stats.mutations_retried += report.retried.len() as u64;
            stats.mutations_evicted += report.evicted.len() as u64;
            stats.last_drain = Some(Instant::now());
        }

        info!(
            synced = report.synced.len(),
            retried = report.retried.len(),
            evicted = report.evicted.len(),
            duration_ms = report.duration.as_millis() as u64,
            "drain finished"
        );
        report
    }

    async fn process(&self, queue: &QueueStore, mutation: &QueuedMutation, report: &mut DrainReport) {
        let id = mutation.id;
        match queue.update(id, &MutationPatch::status(MutationStatus::Syncing)) {
            Ok(_) => {}
            Err(QueueError::NotFound(_)) => {
                debug!(id = %id, "mutation left the queue before dispatch");
                return;
            }
            Err(e) => warn!(id = %id, error = %e, "failed to persist syncing status"),
        }

        let result = self.dispatcher.dispatch(mutation).await;
        match policy::decide(mutation.retry_count, &result, &self.config.retry) {
            Transition::Complete => {
                debug!(id = %id, "mutation applied");
                log_queue_error(
                    id,
                    queue.update(id, &MutationPatch::status(MutationStatus::Completed)),
                );
                log_queue_error(id, queue.remove(id));
                self.invalidator.invalidate(&mutation.entity_ref());
                report.synced.push(id);
            }
            Transition::Retry { retry_count, error } => {
                debug!(id = %id, retry_count, error = %error, "mutation failed, will retry");
                log_queue_error(
                    id,
                    queue.update(
                        id,
                        &MutationPatch::status(MutationStatus::Failed)
                            .with_retry_count(retry_count)
                            .with_error(error),
                    ),
                );
                report.retried.push(id);
            }
            Transition::Evict {
                retry_count,
                error,
                reason,
            } => {
                warn!(id = %id, retry_count, ?reason, error = %error, "evicting mutation");
                log_queue_error(
                    id,
                    queue.update(
                        id,
                        &MutationPatch::status(MutationStatus::Failed)
                            .with_retry_count(retry_count)
                            .with_error(error.clone()),
                    ),
                );
                log_queue_error(id, queue.remove(id));
                self.reporter.emit(SyncEvent::PermanentFailure {
                    id,
                    operation: mutation.operation,
                    entity: mutation.entity_ref(),
                    error,
                    reason,
                });
                report.evicted.push(id);
            }
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }
}

impl<C: HttpClient + 'static> SyncEngine<C> {
    /// Drives the engine until `shutdown` resolves.
    ///
    /// Drains run when connectivity comes back, on every sync interval while
    /// online and on [`trigger_sync`](Self::trigger_sync). Shutdown is only
    /// observed between drains.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let probe = self
            .config
            .probe_interval
            .filter(|interval| !interval.is_zero())
            .map(|interval| {
                self.monitor.spawn_probe(
                    self.dispatcher.client().clone(),
                    self.config.health_path.clone(),
                    interval,
                )
            });

        let mut online = self.monitor.watch();
        let periodic = !self.config.sync_interval.is_zero();
        let period = self.config.sync_interval.max(MIN_TICK);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(dispatch_only = self.is_dispatch_only(), periodic, "sync loop started");
        let mut was_online = *online.borrow_and_update();
        if was_online {
            self.drain().await;
        }

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Ok(()) = online.changed() => {
                    let now_online = *online.borrow_and_update();
                    let reconnected = now_online && !was_online;
                    was_online = now_online;
                    if reconnected {
                        self.drain().await;
                    }
                }
                _ = ticker.tick(), if periodic => {
                    if self.monitor.current_status() {
                        self.drain().await;
                    }
                }
                _ = self.trigger.notified() => {
                    self.drain().await;
                }
            }
        }

        if let Some(probe) = probe {
            probe.abort();
        }
        info!("sync loop stopped");
    }
}

impl<C: HttpClient> std::fmt::Debug for SyncEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("queue", &self.queue)
            .field("online", &self.monitor.current_status())
            .finish()
    }
}

/// Smallest timer period handed to tokio.
const MIN_TICK: Duration = Duration::from_millis(1);

fn log_queue_error<T>(id: MutationId, result: Result<T, QueueError>) {
    if let Err(e) = result {
        warn!(id = %id, error = %e, "failed to persist queue change");
    }
}

/// Holds the in-flight flag for one drain.
///
/// Dropping it mid-drain returns interrupted mutations to `pending`.
struct DrainGuard<'a, C: HttpClient> {
    engine: &'a SyncEngine<C>,
    queue: &'a QueueStore,
}

impl<'a, C: HttpClient> DrainGuard<'a, C> {
    fn acquire(engine: &'a SyncEngine<C>, queue: &'a QueueStore) -> Option<Self> {
        engine
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { engine, queue })
    }
}

impl<C: HttpClient> Drop for DrainGuard<'_, C> {
    fn drop(&mut self) {
        if let Err(e) = self.queue.reset_interrupted() {
            warn!(error = %e, "failed to reset interrupted mutations");
        }
        if self.engine.state().is_active() {
            self.engine.set_state(SyncState::Idle);
            self.engine.reporter.set_syncing(false);
        }
        self.engine.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::error::{HttpError, HttpResult, SyncError};
    use crate::http::{HttpMethod, HttpRequest, HttpResponse, LoopbackClient, LoopbackServer};
    use crate::mutation::EntityKind;
    use crate::status::Severity;
    use outbox_storage::{InMemoryStore, StorageError, StorageResult};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Backend {
        requests: Mutex<Vec<HttpRequest>>,
        failing: AtomicBool,
    }

    impl LoopbackServer for Backend {
        fn handle(&self, request: &HttpRequest) -> HttpResult<HttpResponse> {
            self.requests.lock().push(request.clone());
            if self.failing.load(Ordering::SeqCst) {
                return Err(HttpError::Transport("connection reset".into()));
            }
            Ok(HttpResponse::ok_json(
                request.body.as_ref().unwrap_or(&json!({})),
            ))
        }
    }

    #[derive(Default)]
    struct Notes(Mutex<Vec<(Severity, String)>>);

    impl Notifier for Notes {
        fn notify(&self, severity: Severity, message: &str) {
            self.0.lock().push((severity, message.to_string()));
        }
    }

    #[derive(Default)]
    struct Invalidated(Mutex<Vec<EntityRef>>);

    impl CacheInvalidator for Invalidated {
        fn invalidate(&self, entity: &EntityRef) {
            self.0.lock().push(entity.clone());
        }
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Unavailable("no storage".into()))
        }

        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Unavailable("no storage".into()))
        }

        fn remove(&self, _key: &str) -> StorageResult<()> {
            Err(StorageError::Unavailable("no storage".into()))
        }
    }

    struct Harness {
        engine: SyncEngine<LoopbackClient<Arc<Backend>>>,
        backend: Arc<Backend>,
        notes: Arc<Notes>,
        invalidated: Arc<Invalidated>,
    }

    fn harness(online: bool, storage: Option<Arc<dyn KeyValueStore>>) -> Harness {
        let backend = Arc::new(Backend::default());
        let notes = Arc::new(Notes::default());
        let invalidated = Arc::new(Invalidated::default());
        let config = SyncConfig::new("http://backend.test")
            .without_probe()
            .with_inter_mutation_delay(Duration::ZERO);

        let mut builder = SyncEngine::builder(config, Arc::new(LoopbackClient::new(backend.clone())))
            .with_notifier(notes.clone())
            .with_invalidator(invalidated.clone())
            .initially_online(online);
        if let Some(storage) = storage {
            builder = builder.with_storage(storage);
        }

        Harness {
            engine: builder.build(),
            backend,
            notes,
            invalidated,
        }
    }

    fn stored() -> Option<Arc<dyn KeyValueStore>> {
        Some(Arc::new(InMemoryStore::new()))
    }

    fn approve(id: &str) -> NewMutation {
        NewMutation::update(EntityKind::Creator, json!({"id": id, "review": "approved"}))
    }

    #[test]
    fn state_helpers() {
        assert!(SyncState::Draining.is_active());
        assert!(!SyncState::Idle.is_active());
        assert!(DrainReport::default().is_noop());
        assert_eq!(
            DrainReport::skipped(SkipReason::Offline).skipped,
            Some(SkipReason::Offline)
        );
    }

    #[tokio::test]
    async fn offline_submit_queues_and_notifies() {
        let h = harness(false, stored());

        let submission = h.engine.submit(approve("42")).await.unwrap();
        assert!(matches!(submission, Submission::Queued(_)));
        assert_eq!(h.engine.status().pending_count, 1);

        let notes = h.notes.0.lock();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, Severity::Info);
        assert!(h.backend.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn drain_skips_while_offline() {
        let h = harness(false, stored());
        h.engine.submit(approve("42")).await.unwrap();

        let report = h.engine.drain().await;
        assert_eq!(report.skipped, Some(SkipReason::Offline));
        assert_eq!(h.engine.status().pending_count, 1);
    }

    #[tokio::test]
    async fn online_drain_applies_queue() {
        let h = harness(false, stored());
        h.engine.submit(approve("42")).await.unwrap();
        h.engine.monitor().report_native(true);

        let report = h.engine.drain().await;
        assert_eq!(report.synced.len(), 1);
        assert!(h.engine.queue().unwrap().is_empty());

        let requests = h.backend.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Patch);
        assert_eq!(requests[0].path, "/creators/42");

        let invalidated = h.invalidated.0.lock();
        assert_eq!(invalidated[0].to_string(), "creator/42");

        let status = h.engine.status();
        assert_eq!(status.pending_count, 0);
        assert!(!status.syncing);
        assert!(status.last_sync_at.is_some());
        assert_eq!(h.engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn empty_drain_is_noop() {
        let h = harness(true, stored());

        let report = h.engine.drain().await;
        assert!(report.is_noop());
        assert_eq!(report.skipped, None);
        assert!(h.backend.requests.lock().is_empty());
        assert!(h.notes.0.lock().is_empty());
        assert!(h.engine.status().last_sync_at.is_none());
        assert_eq!(h.engine.stats().drains_completed, 0);
    }

    #[tokio::test]
    async fn failures_consume_budget_then_evict() {
        let h = harness(false, stored());
        let id = match h.engine.submit(approve("42")).await.unwrap() {
            Submission::Queued(id) => id,
            other => panic!("unexpected submission: {other:?}"),
        };
        h.backend.failing.store(true, Ordering::SeqCst);
        h.engine.monitor().report_native(true);

        for attempt in 1..=2 {
            let report = h.engine.drain().await;
            assert_eq!(report.retried, vec![id]);
            let queued = h.engine.queue().unwrap().get(id).unwrap();
            assert_eq!(queued.status, MutationStatus::Failed);
            assert_eq!(queued.retry_count, attempt);
        }

        let report = h.engine.drain().await;
        assert_eq!(report.evicted, vec![id]);
        assert!(h.engine.queue().unwrap().is_empty());

        let status = h.engine.status();
        assert_eq!(status.recent_errors.len(), 1);
        assert_eq!(status.pending_count, 0);

        let errors: Vec<_> = h
            .notes
            .0
            .lock()
            .iter()
            .filter(|(severity, _)| *severity == Severity::Error)
            .cloned()
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(h.engine.stats().mutations_evicted, 1);
    }

    #[tokio::test]
    async fn unsupported_mutation_is_evicted_immediately() {
        let h = harness(true, stored());
        h.engine
            .queue()
            .unwrap()
            .enqueue(NewMutation::delete(EntityKind::Payout, json!({"id": "p1"})))
            .unwrap();

        let report = h.engine.drain().await;
        assert_eq!(report.evicted.len(), 1);
        assert!(h.backend.requests.lock().is_empty());
        assert_eq!(h.engine.status().recent_errors.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_drain_is_skipped() {
        let h = harness(true, stored());
        let queue = h.engine.queue().unwrap().clone();
        let guard = DrainGuard::acquire(&h.engine, &queue).unwrap();

        let report = h.engine.drain().await;
        assert_eq!(report.skipped, Some(SkipReason::InFlight));

        drop(guard);
        let report = h.engine.drain().await;
        assert_eq!(report.skipped, None);
    }

    #[tokio::test]
    async fn custom_budget_is_respected() {
        let backend = Arc::new(Backend::default());
        backend.failing.store(true, Ordering::SeqCst);
        let config = SyncConfig::new("http://backend.test")
            .without_probe()
            .with_retry(RetryConfig::no_retry());
        let engine = SyncEngine::builder(config, Arc::new(LoopbackClient::new(backend)))
            .with_storage(Arc::new(InMemoryStore::new()))
            .build();
        engine.queue().unwrap().enqueue(approve("1")).unwrap();

        let report = engine.drain().await;
        assert_eq!(report.evicted.len(), 1);
    }

    #[tokio::test]
    async fn missing_storage_means_dispatch_only() {
        let h = harness(true, None);
        assert!(h.engine.is_dispatch_only());

        let submission = h.engine.submit(approve("42")).await.unwrap();
        assert!(matches!(submission, Submission::Dispatched(_)));
        assert_eq!(h.backend.requests.lock().len(), 1);
        assert_eq!(h.invalidated.0.lock().len(), 1);
        assert_eq!(
            h.engine.drain().await.skipped,
            Some(SkipReason::DispatchOnly)
        );
    }

    #[tokio::test]
    async fn broken_storage_means_dispatch_only() {
        let h = harness(true, Some(Arc::new(BrokenStore)));
        assert!(h.engine.is_dispatch_only());

        h.backend.failing.store(true, Ordering::SeqCst);
        let err = h.engine.submit(approve("42")).await.unwrap_err();
        assert!(matches!(err, SyncError::Dispatch(_)));
        assert!(h.notes.0.lock().is_empty());
    }

    #[tokio::test]
    async fn run_drains_on_reconnect_and_stops_on_shutdown() {
        let h = harness(false, stored());
        h.engine.submit(approve("42")).await.unwrap();

        let engine = Arc::new(h.engine);
        let mut status = engine.watch_status();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(engine.clone().run(async {
            let _ = stop_rx.await;
        }));

        engine.monitor().report_native(true);
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.pending_count == 0 && s.last_sync_at.is_some()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(h.backend.requests.lock().len(), 1);

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn repeated_online_readings_do_not_drain() {
        let h = harness(true, stored());
        h.backend.failing.store(true, Ordering::SeqCst);
        let id = h.engine.queue().unwrap().enqueue(approve("42")).unwrap();

        let engine = Arc::new(h.engine);
        let mut status = engine.watch_status();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(engine.clone().run(async {
            let _ = stop_rx.await;
        }));

        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.last_sync_at.is_some() && !s.syncing),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(h.backend.requests.lock().len(), 1);

        for _ in 0..3 {
            engine.monitor().record_probe(true);
            engine.monitor().report_native(true);
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.backend.requests.lock().len(), 1);
        let queued = engine.queue().unwrap().get(id).unwrap();
        assert_eq!(queued.retry_count, 1);
        assert!(engine.status().recent_errors.is_empty());

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn zero_sync_interval_disables_periodic_drains() {
        let backend = Arc::new(Backend::default());
        let config = SyncConfig::new("http://backend.test")
            .with_probe_interval(Duration::ZERO)
            .with_sync_interval(Duration::ZERO);
        let engine = Arc::new(
            SyncEngine::builder(config, Arc::new(LoopbackClient::new(backend.clone())))
                .with_storage(Arc::new(InMemoryStore::new()))
                .initially_online(false)
                .build(),
        );
        engine.queue().unwrap().enqueue(approve("1")).unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(engine.clone().run(async {
            let _ = stop_rx.await;
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(backend.requests.lock().is_empty());

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn trigger_wakes_running_loop() {
        let h = harness(true, stored());
        let engine = Arc::new(h.engine);
        let mut status = engine.watch_status();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(engine.clone().run(async {
            let _ = stop_rx.await;
        }));

        engine.submit(approve("7")).await.unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.pending_count == 0 && s.last_sync_at.is_some()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(h.backend.requests.lock()[0].path, "/creators/7");

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
