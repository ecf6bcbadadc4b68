//! End-to-end tests of the sync engine against the fake backend.

use outbox_engine::{
    EntityKind, LoopbackClient, MutationStatus, NewMutation, Severity, SkipReason, Submission,
    SyncEngine, SyncSnapshot,
};
use outbox_storage::{FileStore, InMemoryStore, KeyValueStore};
use outbox_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn approve(id: &str) -> NewMutation {
    NewMutation::update(EntityKind::Creator, json!({"id": id, "review": "approved"}))
}

fn expected_lines(t: &TestEngine) -> Vec<String> {
    t.engine
        .queue()
        .unwrap()
        .list()
        .iter()
        .map(|m| {
            let request = t.engine.dispatcher().build_request(m).unwrap();
            format!("{} {}", request.method, request.path)
        })
        .collect()
}

#[tokio::test]
async fn queued_update_is_replayed_after_reconnect() {
    let t = TestEngine::offline();
    t.backend
        .seed("creators", "42", json!({"id": "42", "review": "pending"}));

    t.engine.submit(approve("42")).await.unwrap();
    assert_eq!(t.engine.status().pending_count, 1);
    assert_eq!(t.notifier.count(Severity::Info), 1);

    t.go_online();
    let report = t.engine.drain().await;

    assert_eq!(report.synced.len(), 1);
    assert_eq!(t.backend.request_lines(), vec!["PATCH /creators/42"]);
    assert_eq!(
        t.backend.entity("creators", "42"),
        Some(json!({"id": "42", "review": "approved"}))
    );
    assert!(t.engine.queue().unwrap().is_empty());
    assert_eq!(t.engine.status().pending_count, 0);
    assert_eq!(t.notifier.count(Severity::Success), 1);
}

#[tokio::test]
async fn three_failures_evict_with_one_notification() {
    let t = TestEngine::offline();
    t.engine.submit(approve("42")).await.unwrap();
    t.engine
        .submit(NewMutation::create(EntityKind::Campaign, json!({"name": "spring"})))
        .await
        .unwrap();
    t.backend.fail_path("/creators/42", Failure::Status(500));
    t.go_online();

    let errors_before = t.engine.status().recent_errors.len();
    let pending_before = t.engine.status().pending_count;

    for _ in 0..3 {
        t.engine.drain().await;
    }
    // A fourth drain has nothing left to do
    assert!(t.engine.drain().await.is_noop());

    let status = t.engine.status();
    assert_eq!(status.recent_errors.len(), errors_before + 1);
    assert_eq!(status.pending_count, pending_before - 2);
    assert_eq!(t.notifier.count(Severity::Error), 1);
    assert!(t.engine.queue().unwrap().is_empty());

    let attempts = t
        .backend
        .request_lines()
        .iter()
        .filter(|line| line.as_str() == "PATCH /creators/42")
        .count();
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn one_drain_processes_two_entities_in_order() {
    let t = TestEngine::offline();
    t.backend.seed("creators", "1", json!({"id": "1"}));
    t.engine
        .submit(NewMutation::create(
            EntityKind::Campaign,
            json!({"id": "c9", "name": "launch"}),
        ))
        .await
        .unwrap();
    t.engine.submit(approve("1")).await.unwrap();

    t.go_online();
    let report = t.engine.drain().await;

    assert_eq!(report.synced.len(), 2);
    assert_eq!(
        t.backend.request_lines(),
        vec!["POST /campaigns", "PATCH /creators/1"]
    );
    assert_eq!(t.invalidator.rendered(), vec!["campaign/c9", "creator/1"]);
    assert_eq!(t.notifier.count(Severity::Success), 1);
}

#[tokio::test]
async fn corrupt_queue_loads_empty() {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::with_entries([(
        "outbox.mutation_queue",
        "[{\"id\": \"not-a-uuid\"",
    )]));
    let t = TestEngine::with_store(store, false);

    assert!(t.engine.queue().unwrap().is_empty());
    t.engine.submit(approve("42")).await.unwrap();
    assert_eq!(t.engine.status().pending_count, 1);
}

#[tokio::test]
async fn empty_drain_changes_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let t = TestEngine::with_store(store.clone(), true);
    let before = store.snapshot();

    let report = t.engine.drain().await;

    assert!(report.is_noop());
    assert_eq!(report.skipped, None);
    assert_eq!(store.snapshot(), before);
    assert!(t.backend.requests().is_empty());
    assert!(t.notifier.entries().is_empty());
}

#[tokio::test]
async fn no_mutation_is_left_syncing() {
    let t = TestEngine::offline();
    for id in ["1", "2", "3"] {
        t.backend.seed("creators", id, json!({"id": id}));
        t.engine.submit(approve(id)).await.unwrap();
    }
    t.backend.fail_path("/creators/2", Failure::Transport);
    t.go_online();

    let first = t.engine.drain().await;
    assert_eq!(first.synced.len(), 2);
    assert_eq!(first.retried.len(), 1);

    let remaining = t.engine.queue().unwrap().list();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].status, MutationStatus::Failed);
    assert!(remaining[0].last_error.is_some());

    t.engine.drain().await;
    let last = t.engine.drain().await;
    assert_eq!(last.evicted.len(), 1);
    assert!(t.engine.queue().unwrap().is_empty());
}

#[tokio::test]
async fn unsupported_pair_is_evicted_without_dispatch() {
    let t = TestEngine::online();
    t.engine
        .queue()
        .unwrap()
        .enqueue(NewMutation::update(EntityKind::Payout, json!({"id": "p1"})))
        .unwrap();

    let report = t.engine.drain().await;

    assert_eq!(report.evicted.len(), 1);
    assert!(t.backend.requests().is_empty());
    assert_eq!(t.notifier.count(Severity::Error), 1);
    assert_eq!(t.engine.status().recent_errors.len(), 1);
}

#[tokio::test]
async fn queue_survives_restart() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new());

    let expected = {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(dir.path()).unwrap());
        let t = TestEngine::build(test_config(), store, backend.clone(), false);
        t.engine.submit(approve("1")).await.unwrap();
        t.engine
            .submit(NewMutation::create(EntityKind::Submission, json!({"id": "s1"})))
            .await
            .unwrap();
        t.engine
            .submit(NewMutation::delete(EntityKind::Campaign, json!({"id": 5})))
            .await
            .unwrap();
        expected_lines(&t)
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(dir.path()).unwrap());
    let t = TestEngine::build(test_config(), store, backend, true);
    assert_eq!(t.engine.status().pending_count, 3);

    t.engine.drain().await;
    assert_eq!(t.backend.request_lines(), expected);
}

#[tokio::test]
async fn snapshot_is_persisted_after_drain() {
    let t = TestEngine::offline();
    t.engine.submit(approve("404")).await.unwrap();
    t.backend.fail_path("/creators/404", Failure::Status(404));
    t.go_online();

    for _ in 0..3 {
        t.engine.drain().await;
    }

    let raw = t.store.get("outbox.last_sync").unwrap().unwrap();
    let snapshot: SyncSnapshot = serde_json::from_str(&raw).unwrap();
    assert!(snapshot.last_sync_at.is_some());
    assert_eq!(snapshot.sync_errors.len(), 1);

    let restarted = t.restart(true);
    assert_eq!(restarted.engine.status().recent_errors, snapshot.sync_errors);
}

#[tokio::test]
async fn dispatch_only_without_storage() {
    let backend = Arc::new(FakeBackend::new());
    let engine = SyncEngine::builder(
        test_config(),
        Arc::new(LoopbackClient::new(backend.clone())),
    )
    .build();

    assert!(engine.is_dispatch_only());
    let submission = engine
        .submit(NewMutation::create(EntityKind::Creator, json!({"name": "ada"})))
        .await
        .unwrap();
    assert!(matches!(submission, Submission::Dispatched(outcome) if outcome.status == 201));
    assert_eq!(backend.entity_count("creators"), 1);
    assert_eq!(engine.drain().await.skipped, Some(SkipReason::DispatchOnly));
}

#[tokio::test]
async fn probe_drives_the_loop() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_healthy(false);
    let config = test_config().with_probe_interval(Duration::from_millis(20));
    let t = TestEngine::build(
        config,
        Arc::new(InMemoryStore::new()),
        backend.clone(),
        true,
    );
    let mut status = t.engine.watch_status();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(t.engine.clone().run(async {
        let _ = stop_rx.await;
    }));

    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| !s.online))
        .await
        .unwrap()
        .unwrap();

    t.engine
        .submit(NewMutation::create(EntityKind::Campaign, json!({"name": "x"})))
        .await
        .unwrap();
    assert_eq!(t.notifier.count(Severity::Info), 1);

    backend.set_healthy(true);
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.online && s.pending_count == 0 && s.last_sync_at.is_some()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(backend.request_lines(), vec!["POST /campaigns"]);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn steady_probe_successes_do_not_spend_retries() {
    let backend = Arc::new(FakeBackend::new());
    backend.fail_path("/campaigns", Failure::Status(503));
    let config = test_config().with_probe_interval(Duration::from_millis(5));
    let t = TestEngine::build(
        config,
        Arc::new(InMemoryStore::new()),
        backend.clone(),
        true,
    );
    let mut status = t.engine.watch_status();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(t.engine.clone().run(async {
        let _ = stop_rx.await;
    }));

    let id = match t
        .engine
        .submit(NewMutation::create(EntityKind::Campaign, json!({"name": "x"})))
        .await
        .unwrap()
    {
        Submission::Queued(id) => id,
        other => panic!("unexpected submission: {other:?}"),
    };
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.last_sync_at.is_some() && !s.syncing),
    )
    .await
    .unwrap()
    .unwrap();

    // Many healthy probes while already online
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(backend.request_lines(), vec!["POST /campaigns"]);
    assert_eq!(t.engine.queue().unwrap().get(id).unwrap().retry_count, 1);
    assert!(t.engine.status().recent_errors.is_empty());

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn drains_dispatch_in_queue_order(batch in mutation_batch_strategy(8)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let t = TestEngine::offline();
            for mutation in batch {
                t.engine.submit(mutation).await.unwrap();
            }
            let expected = expected_lines(&t);

            t.go_online();
            t.engine.drain().await;

            assert_eq!(t.backend.request_lines(), expected);
        });
    }

    #[test]
    fn restart_preserves_dispatch_sequence(batch in mutation_batch_strategy(6)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let straight = TestEngine::offline();
            let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
            let before_restart = TestEngine::with_store(store, false);
            for mutation in batch {
                straight.engine.submit(mutation.clone()).await.unwrap();
                before_restart.engine.submit(mutation).await.unwrap();
            }

            let restarted = before_restart.restart(true);
            drop(before_restart);

            straight.go_online();
            straight.engine.drain().await;
            restarted.engine.drain().await;

            assert_eq!(
                straight.backend.request_lines(),
                restarted.backend.request_lines()
            );
        });
    }
}
