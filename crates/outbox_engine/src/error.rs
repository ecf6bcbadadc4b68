//! Error types for the sync engine.

use crate::mutation::{EntityKind, MutationId, OperationKind};
use outbox_storage::StorageError;
use thiserror::Error;

/// Result type for HTTP client calls.
pub type HttpResult<T> = Result<T, HttpError>;

/// Result type for dispatcher calls.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors produced by an [`HttpClient`](crate::HttpClient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// Connection refused, DNS failure, reset, etc.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the client timeout.
    #[error("request timed out")]
    Timeout,

    /// The response body could not be read.
    #[error("invalid response body: {0}")]
    Body(String),

    /// The client could not be constructed.
    #[error("client setup failed: {0}")]
    Setup(String),
}

/// Errors produced while dispatching one mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No route exists for this (entity kind, operation kind) pair.
    #[error("unsupported mutation: {operation} {entity}")]
    Unsupported {
        /// Entity kind of the mutation.
        entity: EntityKind,
        /// Operation kind of the mutation.
        operation: OperationKind,
    },

    /// The payload cannot produce a request (e.g. missing `id`).
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The backend answered with a non-success status.
    #[error("server returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The request never produced a response.
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl DispatchError {
    /// Returns true if the mutation may be attempted again.
    ///
    /// Network-level failures are retryable; a mutation the dispatcher can
    /// never turn into a request is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Unsupported { .. } | DispatchError::InvalidPayload(_) => false,
            DispatchError::Status { .. } | DispatchError::Http(_) => true,
        }
    }
}

/// Errors produced by the durable queue.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The key-value store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The queue could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No mutation with this id is queued.
    #[error("mutation not found: {0}")]
    NotFound(MutationId),
}

/// Errors surfaced by the engine to its callers.
///
/// Errors inside a drain never reach callers; they are attached to the
/// affected mutation instead.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Queue operation failed.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Immediate dispatch failed (dispatch-only mode).
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// HTTP client could not be built.
    #[error("http error: {0}")]
    Http(#[from] HttpError),
}
