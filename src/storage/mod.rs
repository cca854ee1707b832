//! Storage module for persisting items and run state
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Atomic item discovery upserts and extraction updates
//! - Explorer configuration, cache and checkpoint persistence
//! - Run results and execution audit records

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::TidewatchError;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Storage handle shared by the engines, the context and the discovery service
///
/// Locks are only held inside synchronous calls, never across an `.await`.
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Wraps a storage backend into a `SharedStorage`
pub fn shared<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Runs `f` with exclusive access to the storage backend
pub fn with_storage<T>(
    storage: &SharedStorage,
    f: impl FnOnce(&mut dyn Storage) -> StorageResult<T>,
) -> StorageResult<T> {
    let mut guard = storage.lock().map_err(|_| StorageError::LockPoisoned)?;
    f(&mut *guard)
}

/// Initializes or opens a storage database, creating parent directories
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(TidewatchError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, TidewatchError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(SqliteStorage::new(path)?)
}
