//! File-based key-value store for persistent storage.
//!
//! Directory layout:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK                       # Advisory lock for single-owner access
//! ├─ outbox.mutation_queue      # One file per key
//! └─ outbox.last_sync
//! ```

use crate::backend::{validate_key, KeyValueStore};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const TEMP_SUFFIX: &str = ".tmp";

/// A directory-backed key-value store.
///
/// Each key is stored in its own file. Writes use the write-then-rename
/// pattern so a crash never leaves a half-written value behind.
///
/// # Durability
///
/// - `set()` writes a temp file, calls `File::sync_all()`, renames it over
///   the key file and fsyncs the directory
/// - `remove()` deletes the key file and fsyncs the directory
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads. The directory
/// is held under an exclusive advisory lock for the lifetime of the store, so
/// only one process can own a queue at a time.
///
/// # Example
///
/// ```no_run
/// use outbox_storage::{KeyValueStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("outbox-data")).unwrap();
/// store.set("outbox.mutation_queue", "[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    _lock_file: File,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens or creates a store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - The path exists but is not a directory
    /// - Another process holds the lock (returns `Locked`)
    pub fn open(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;

        if !path.is_dir() {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("store path is not a directory: {}", path.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        if key == LOCK_FILE {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.path.join(key))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        // NTFS journals metadata; directory handles cannot be fsynced.
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.key_path(key)?;

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| StorageError::InvalidEncoding {
                key: key.to_string(),
            })
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        let temp_path = self.path.join(format!("{key}{TEMP_SUFFIX}"));
        let _guard = self.write_lock.lock();

        let mut file = File::create(&temp_path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        self.sync_directory()
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        let _guard = self.write_lock.lock();

        match fs::remove_file(&path) {
            Ok(()) => self.sync_directory(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
