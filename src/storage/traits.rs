//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{
    ExecutionRecord, ExplorerRunConfig, ExplorerRunResult, Filter, HistoryEntry, Item, LastRun,
    Network, NewItem, RunCache,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Filter {filter} is malformed: {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every method is a single unit of work; implementations must make
/// `discover_item` and `update_item_data` atomic so that independent
/// processes sharing one backing store stay consistent.
pub trait Storage {
    // ===== Items =====

    /// Records a discovery
    ///
    /// In one atomic statement: refreshes `last_discovered` of the item with
    /// the same identifier, or inserts a new item in state `created`.
    ///
    /// # Returns
    ///
    /// `true` if the item did not exist before
    fn discover_item(&mut self, item: &NewItem) -> StorageResult<bool>;

    /// Gets an item by identifier, including its history
    fn get_item(&self, identifier: &str) -> StorageResult<Option<Item>>;

    /// Identifiers of every item selected by a filter, in filter order
    ///
    /// `now` anchors relative conditions such as `notCheckedWithinHours`.
    fn find_item_identifiers(&self, filter: &Filter, now: DateTime<Utc>)
        -> StorageResult<Vec<String>>;

    /// Gets items with their history, in the order of `identifiers`
    ///
    /// Identifiers with no stored item are skipped.
    fn get_items(&self, identifiers: &[String]) -> StorageResult<Vec<Item>>;

    /// Stores newly extracted data, optionally appending a history entry
    ///
    /// Sets state `fetched`, `last_updated` and `last_checked_at`, and clears
    /// any previous error, in one transaction with the history append.
    fn update_item_data(
        &mut self,
        identifier: &str,
        data: &Value,
        history: Option<&HistoryEntry>,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Soft-deletes an item (state `removed`, `deleted_at` set)
    fn mark_item_removed(&mut self, identifier: &str, at: DateTime<Utc>) -> StorageResult<()>;

    /// Records an extractor reported error (state `error`)
    fn mark_item_error(
        &mut self,
        identifier: &str,
        error: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Counts items, optionally restricted to one network
    fn count_items(&self, network_key: Option<&str>) -> StorageResult<u64>;

    // ===== Networks & filters =====

    fn get_network(&self, key: &str) -> StorageResult<Option<Network>>;

    fn upsert_network(&mut self, network: &Network) -> StorageResult<()>;

    /// Gets a filter; a stored filter with malformed query text is an error
    fn get_filter(&self, network_key: &str, key: &str) -> StorageResult<Option<Filter>>;

    /// Lists all filters ordered by network and key
    fn list_filters(&self) -> StorageResult<Vec<Filter>>;

    fn upsert_filter(&mut self, filter: &Filter) -> StorageResult<()>;

    // ===== Explorer state =====

    fn get_explorer_config(
        &self,
        network_key: &str,
        explorer_key: &str,
    ) -> StorageResult<Option<ExplorerRunConfig>>;

    /// Inserts an explorer configuration, or replaces only the `configuration`
    /// of an existing one (cache and last run survive re-seeding)
    fn upsert_explorer_config(&mut self, config: &ExplorerRunConfig) -> StorageResult<()>;

    /// Replaces the whole persisted cache map of an explorer
    fn save_explorer_cache(
        &mut self,
        network_key: &str,
        explorer_key: &str,
        cache: &RunCache,
    ) -> StorageResult<()>;

    /// Replaces the last run markers of an explorer
    fn save_last_run(
        &mut self,
        network_key: &str,
        explorer_key: &str,
        last_run: &LastRun,
    ) -> StorageResult<()>;

    fn append_run_result(&mut self, result: &ExplorerRunResult) -> StorageResult<()>;

    /// Lists run results of an explorer, oldest first
    fn list_run_results(
        &self,
        network_key: &str,
        explorer_key: &str,
    ) -> StorageResult<Vec<ExplorerRunResult>>;

    // ===== Execution audit =====

    /// Opens an execution record and returns its id
    fn start_execution(&mut self, arguments: &Value, at: DateTime<Utc>) -> StorageResult<i64>;

    /// Closes an execution record
    fn finish_execution(
        &mut self,
        id: i64,
        error: Option<&str>,
        result: &Value,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    fn get_execution(&self, id: i64) -> StorageResult<ExecutionRecord>;
}
