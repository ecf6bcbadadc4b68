//! # Outbox Testkit
//!
//! Test utilities for the outbox sync engine.
//!
//! This crate provides:
//! - A fake REST backend with failure injection
//! - A scripted HTTP client
//! - Recording notifier and cache invalidator
//! - A ready-made engine wired to all of the above
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use outbox_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn drains_after_reconnect() {
//!     let t = TestEngine::offline();
//!     t.engine.submit(mutation).await.unwrap();
//!     t.go_online();
//!     t.engine.drain().await;
//!     assert_eq!(t.backend.request_lines().len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod fixtures;
pub mod generators;
pub mod scripted;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scripted::*;
}

pub use backend::*;
pub use fixtures::*;
pub use generators::*;
pub use scripted::*;
