//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key cannot be used by this store.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Another process holds the store directory.
    #[error("store directory is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    /// A stored value is not valid UTF-8.
    #[error("stored value for key {key:?} is not valid UTF-8")]
    InvalidEncoding {
        /// The key whose value could not be decoded.
        key: String,
    },

    /// The store cannot be used in this runtime.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
