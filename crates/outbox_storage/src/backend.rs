//! Key-value store trait definition.

use crate::error::{StorageError, StorageResult};
use std::sync::Arc;

/// Maximum accepted key length in bytes.
const MAX_KEY_LEN: usize = 128;

/// A synchronous, durable key-value store.
///
/// Stores are **opaque string stores**. The sync engine keeps two keys in a
/// store (the mutation queue and the last sync snapshot) and owns their JSON
/// encoding; stores never look inside values.
///
/// # Invariants
///
/// - `get` returns exactly the value passed to the last successful `set`
/// - a successful `set` survives process termination (for durable stores)
/// - `remove` on a missing key is not an error
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key has never been set or was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// After this returns successfully the value is durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key` from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }
}

/// Checks that a key is usable by every store.
///
/// Keys are restricted to ASCII letters, digits, `.`, `_` and `-` so that the
/// file store can map them directly to file names.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for empty, overlong, dot-only or
/// otherwise unsafe keys.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid_chars = key
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));

    if key.is_empty() || key.len() > MAX_KEY_LEN || !valid_chars || key.bytes().all(|b| b == b'.')
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    Ok(())
}
