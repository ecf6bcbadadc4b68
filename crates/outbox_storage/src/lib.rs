//! # Outbox Storage
//!
//! Durable key-value storage for the Outbox sync engine.
//!
//! This crate provides the lowest-level persistence abstraction used by the
//! mutation queue. Stores are **opaque string stores** - they do not interpret
//! the values they hold. The engine owns the JSON layout.
//!
//! ## Design Principles
//!
//! - Synchronous `get` / `set` / `remove`, nothing more
//! - A successful `set` is durable before it returns
//! - Must be `Send + Sync` so the engine can share one store across tasks
//! - No knowledge of queued mutations or sync snapshots
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral sessions
//! - [`FileStore`] - One file per key in a locked directory
//!
//! ## Example
//!
//! ```rust
//! use outbox_storage::{KeyValueStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.set("outbox.mutation_queue", "[]").unwrap();
//! assert_eq!(store.get("outbox.mutation_queue").unwrap().as_deref(), Some("[]"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, KeyValueStore};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
