//! # Outbox Sync Engine
//!
//! Offline-tolerant mutation queue and sync loop.
//!
//! This crate provides:
//! - Durable, write-through queue of pending mutations
//! - Connectivity monitor merging native events with a reachability probe
//! - Mutation dispatcher mapping (entity kind, operation) to HTTP requests
//! - Sync loop draining the queue sequentially with a bounded retry budget
//! - Status reporter with user-facing notifications
//!
//! ## Architecture
//!
//! Writes are queued first and replayed later:
//! 1. `submit` appends the mutation to the queue and persists it
//! 2. When the backend is reachable, a drain dispatches eligible mutations
//!    one at a time, in queue order
//! 3. Applied mutations are removed and their cached reads invalidated;
//!    failed ones are retried on later drains until the budget runs out
//!
//! ## Key Invariants
//!
//! - At most one drain runs at a time
//! - Mutations are dispatched strictly in insertion order
//! - Every queue change is persisted before the next dispatch
//! - A mutation is evicted after three failed attempts, or at once if it can
//!   never succeed
//! - No dispatch or probe failure escapes a drain
//!
//! Concurrent edits are resolved last-write-wins: a queued mutation is sent
//! as-is even if the server-side entity changed after it was queued.
//!
//! ## Example
//!
//! ```rust,no_run
//! use outbox_engine::{EntityKind, NewMutation, SyncConfig, SyncEngine};
//! use outbox_storage::FileStore;
//! use serde_json::json;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(
//!     SyncEngine::connect(SyncConfig::new("https://api.example.com"))?
//!         .with_storage(Arc::new(FileStore::open(Path::new("./outbox-data"))?))
//!         .build(),
//! );
//!
//! engine
//!     .submit(NewMutation::update(
//!         EntityKind::Creator,
//!         json!({"id": "42", "review": "approved"}),
//!     ))
//!     .await?;
//!
//! engine.clone().run(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod dispatcher;
mod error;
mod http;
mod mutation;
mod policy;
mod queue;
mod state;
mod status;

pub use config::{RetryConfig, SyncConfig, DEFAULT_NAMESPACE};
pub use connectivity::{
    probe_once, ConnectivityMonitor, ConnectivityReading, ListenerId, SignalSource,
    StatusListener,
};
pub use dispatcher::{DispatchOutcome, Dispatcher, Route, RouteTable};
pub use error::{
    DispatchError, DispatchResult, HttpError, HttpResult, QueueError, QueueResult, SyncError,
    SyncResult,
};
pub use http::{
    HttpClient, HttpFuture, HttpMethod, HttpRequest, HttpResponse, LoopbackClient,
    LoopbackServer, ReqwestClient,
};
pub use mutation::{
    payload_id, EntityKind, EntityRef, MutationId, MutationPatch, MutationStatus, NewMutation,
    OperationKind, ParseKindError, QueuedMutation,
};
pub use policy::{decide, EvictionReason, Transition};
pub use queue::QueueStore;
pub use state::{
    CacheInvalidator, DrainReport, NoopInvalidator, SkipReason, Submission, SyncEngine,
    SyncEngineBuilder, SyncState, SyncStats,
};
pub use status::{
    Notifier, Severity, StatusReporter, SyncEvent, SyncSnapshot, SyncStatus, TracingNotifier,
};
