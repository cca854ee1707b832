//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{
    timestamp, ExecutionRecord, ExplorerRunConfig, ExplorerRunResult, Filter, HistoryEntry, Item,
    ItemState, LastRun, Network, NewItem, Options, RunCache, RunStatus,
};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

const ITEM_COLUMNS: &str = "identifier, network_key, url, external_id, discovered_at, \
     last_discovered, last_checked_at, last_updated, deleted_at, state, data, error";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // WAL lets an explorer and an extractor process share the file
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (tests and dry runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_history(&self, identifier: &str) -> StorageResult<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, changeset FROM item_history WHERE identifier = ?1 ORDER BY id ASC",
        )?;

        let history = stmt
            .query_map(params![identifier], |row| {
                Ok(HistoryEntry {
                    date: timestamp_column(row, 0)?,
                    changeset: json_column(row, 1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(history)
    }

    fn with_history(&self, mut items: Vec<Item>) -> StorageResult<Vec<Item>> {
        for item in &mut items {
            item.history = self.load_history(&item.identifier)?;
        }
        Ok(items)
    }

    fn require_updated(&self, changed: usize, identifier: &str) -> StorageResult<()> {
        if changed == 0 {
            return Err(StorageError::NotFound(format!("Item {}", identifier)));
        }
        Ok(())
    }
}

impl Storage for SqliteStorage {
    // ===== Items =====

    fn discover_item(&mut self, item: &NewItem) -> StorageResult<bool> {
        // Single statement: concurrent processes can not both insert
        let discovery_count: i64 = self.conn.query_row(
            "INSERT INTO items (identifier, network_key, url, external_id, discovered_at,
                                last_discovered, state, discovery_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, 1)
             ON CONFLICT(identifier) DO UPDATE SET
                 last_discovered = excluded.last_discovered,
                 discovery_count = items.discovery_count + 1
             RETURNING discovery_count",
            params![
                item.identifier,
                item.network_key,
                item.url,
                item.external_id,
                timestamp(item.discovered_at),
                ItemState::Created.to_db_string(),
            ],
            |row| row.get(0),
        )?;

        Ok(discovery_count == 1)
    }

    fn get_item(&self, identifier: &str) -> StorageResult<Option<Item>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {} FROM items WHERE identifier = ?1", ITEM_COLUMNS),
                params![identifier],
                item_from_row,
            )
            .optional()?;

        match item {
            Some(mut item) => {
                item.history = self.load_history(&item.identifier)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    fn find_item_identifiers(
        &self,
        filter: &Filter,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<String>> {
        let query = &filter.query;
        let mut sql = "SELECT identifier FROM items WHERE network_key = ?".to_string();
        let mut values: Vec<SqlValue> = vec![SqlValue::Text(filter.network_key.clone())];

        if !query.states.is_empty() {
            let placeholders = vec!["?"; query.states.len()].join(", ");
            sql.push_str(&format!(" AND state IN ({})", placeholders));
            values.extend(
                query
                    .states
                    .iter()
                    .map(|s| SqlValue::Text(s.to_db_string().to_string())),
            );
        }

        for (column, value) in [
            ("external_id", &query.external_id),
            ("identifier", &query.identifier),
            ("url", &query.url),
        ] {
            if let Some(value) = value {
                sql.push_str(&format!(" AND {} = ?", column));
                values.push(SqlValue::Text(value.clone()));
            }
        }

        if let Some(hours) = query.not_checked_within_hours {
            let cutoff = now - Duration::hours(hours);
            sql.push_str(" AND (last_checked_at IS NULL OR last_checked_at < ?)");
            values.push(SqlValue::Text(timestamp(cutoff)));
        }

        let direction = if filter.sort.descending { "DESC" } else { "ASC" };
        sql.push_str(&format!(
            " ORDER BY {} {}, identifier ASC",
            filter.sort.field.column(),
            direction
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let identifiers = stmt
            .query_map(params_from_iter(values.iter()), |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(identifiers)
    }

    fn get_items(&self, identifiers: &[String]) -> StorageResult<Vec<Item>> {
        if identifiers.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; identifiers.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM items WHERE identifier IN ({})",
            ITEM_COLUMNS, placeholders
        ))?;
        let mut found: HashMap<String, Item> = stmt
            .query_map(params_from_iter(identifiers.iter()), item_from_row)?
            .map(|item| item.map(|item| (item.identifier.clone(), item)))
            .collect::<Result<_, _>>()?;

        let items = identifiers
            .iter()
            .filter_map(|identifier| found.remove(identifier))
            .collect();
        self.with_history(items)
    }

    fn update_item_data(
        &mut self,
        identifier: &str,
        data: &Value,
        history: Option<&HistoryEntry>,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        if let Some(entry) = history {
            tx.execute(
                "INSERT INTO item_history (identifier, date, changeset) VALUES (?1, ?2, ?3)",
                params![
                    identifier,
                    timestamp(entry.date),
                    serde_json::to_string(&entry.changeset)?
                ],
            )?;
        }

        let at = timestamp(at);
        let changed = tx.execute(
            "UPDATE items SET data = ?1, last_updated = ?2, last_checked_at = ?2, state = ?3,
             error = NULL WHERE identifier = ?4",
            params![
                serde_json::to_string(data)?,
                at,
                ItemState::Fetched.to_db_string(),
                identifier
            ],
        )?;
        if changed == 0 {
            // Dropping the transaction rolls the history append back
            return Err(StorageError::NotFound(format!("Item {}", identifier)));
        }

        tx.commit()?;
        Ok(())
    }

    fn mark_item_removed(&mut self, identifier: &str, at: DateTime<Utc>) -> StorageResult<()> {
        let at = timestamp(at);
        let changed = self.conn.execute(
            "UPDATE items SET state = ?1, deleted_at = ?2, last_checked_at = ?2
             WHERE identifier = ?3",
            params![ItemState::Removed.to_db_string(), at, identifier],
        )?;
        self.require_updated(changed, identifier)
    }

    fn mark_item_error(
        &mut self,
        identifier: &str,
        error: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE items SET state = ?1, error = ?2, last_checked_at = ?3 WHERE identifier = ?4",
            params![
                ItemState::Error.to_db_string(),
                error,
                timestamp(at),
                identifier
            ],
        )?;
        self.require_updated(changed, identifier)
    }

    fn count_items(&self, network_key: Option<&str>) -> StorageResult<u64> {
        let count: i64 = match network_key {
            Some(key) => self.conn.query_row(
                "SELECT COUNT(*) FROM items WHERE network_key = ?1",
                params![key],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    // ===== Networks & filters =====

    fn get_network(&self, key: &str) -> StorageResult<Option<Network>> {
        let network = self
            .conn
            .query_row(
                "SELECT key, configuration FROM networks WHERE key = ?1",
                params![key],
                |row| {
                    Ok(Network {
                        key: row.get(0)?,
                        configuration: optional_json_column(row, 1)?,
                    })
                },
            )
            .optional()?;
        Ok(network)
    }

    fn upsert_network(&mut self, network: &Network) -> StorageResult<()> {
        let configuration = network
            .configuration
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO networks (key, configuration) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET configuration = excluded.configuration",
            params![network.key, configuration],
        )?;
        Ok(())
    }

    fn get_filter(&self, network_key: &str, key: &str) -> StorageResult<Option<Filter>> {
        let raw = self
            .conn
            .query_row(
                "SELECT network_key, key, description, query, sort FROM filters
                 WHERE network_key = ?1 AND key = ?2",
                params![network_key, key],
                raw_filter_from_row,
            )
            .optional()?;

        raw.map(RawFilter::into_filter).transpose()
    }

    fn list_filters(&self) -> StorageResult<Vec<Filter>> {
        let mut stmt = self.conn.prepare(
            "SELECT network_key, key, description, query, sort FROM filters
             ORDER BY network_key, key",
        )?;

        let raw = stmt
            .query_map([], raw_filter_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter().map(RawFilter::into_filter).collect()
    }

    fn upsert_filter(&mut self, filter: &Filter) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO filters (network_key, key, description, query, sort)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(network_key, key) DO UPDATE SET
                 description = excluded.description,
                 query = excluded.query,
                 sort = excluded.sort",
            params![
                filter.network_key,
                filter.key,
                filter.description,
                serde_json::to_string(&filter.query)?,
                serde_json::to_string(&filter.sort)?,
            ],
        )?;
        Ok(())
    }

    // ===== Explorer state =====

    fn get_explorer_config(
        &self,
        network_key: &str,
        explorer_key: &str,
    ) -> StorageResult<Option<ExplorerRunConfig>> {
        let config = self
            .conn
            .query_row(
                "SELECT network_key, explorer_key, configuration, cache, last_run
                 FROM explorer_configs WHERE network_key = ?1 AND explorer_key = ?2",
                params![network_key, explorer_key],
                |row| {
                    Ok(ExplorerRunConfig {
                        network_key: row.get(0)?,
                        explorer_key: row.get(1)?,
                        configuration: json_column::<Options>(row, 2)?,
                        cache: json_column::<RunCache>(row, 3)?,
                        last_run: optional_json_column::<LastRun>(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(config)
    }

    fn upsert_explorer_config(&mut self, config: &ExplorerRunConfig) -> StorageResult<()> {
        let last_run = config
            .last_run
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO explorer_configs (network_key, explorer_key, configuration, cache, last_run)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(network_key, explorer_key) DO UPDATE SET
                 configuration = excluded.configuration",
            params![
                config.network_key,
                config.explorer_key,
                serde_json::to_string(&config.configuration)?,
                serde_json::to_string(&config.cache)?,
                last_run,
            ],
        )?;
        Ok(())
    }

    fn save_explorer_cache(
        &mut self,
        network_key: &str,
        explorer_key: &str,
        cache: &RunCache,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE explorer_configs SET cache = ?1 WHERE network_key = ?2 AND explorer_key = ?3",
            params![serde_json::to_string(cache)?, network_key, explorer_key],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!(
                "Explorer {}:{}",
                network_key, explorer_key
            )));
        }
        Ok(())
    }

    fn save_last_run(
        &mut self,
        network_key: &str,
        explorer_key: &str,
        last_run: &LastRun,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE explorer_configs SET last_run = ?1 WHERE network_key = ?2 AND explorer_key = ?3",
            params![serde_json::to_string(last_run)?, network_key, explorer_key],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!(
                "Explorer {}:{}",
                network_key, explorer_key
            )));
        }
        Ok(())
    }

    fn append_run_result(&mut self, result: &ExplorerRunResult) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO explorer_results (network_key, explorer_key, status, date, stats, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                result.network_key,
                result.explorer_key,
                result.status.to_db_string(),
                timestamp(result.date),
                serde_json::to_string(&result.stats)?,
                result.error,
            ],
        )?;
        Ok(())
    }

    fn list_run_results(
        &self,
        network_key: &str,
        explorer_key: &str,
    ) -> StorageResult<Vec<ExplorerRunResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT network_key, explorer_key, status, date, stats, error FROM explorer_results
             WHERE network_key = ?1 AND explorer_key = ?2 ORDER BY id ASC",
        )?;

        let results = stmt
            .query_map(params![network_key, explorer_key], |row| {
                Ok(ExplorerRunResult {
                    network_key: row.get(0)?,
                    explorer_key: row.get(1)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(2)?)
                        .unwrap_or(RunStatus::Failed),
                    date: timestamp_column(row, 3)?,
                    stats: json_column(row, 4)?,
                    error: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(results)
    }

    // ===== Execution audit =====

    fn start_execution(&mut self, arguments: &Value, at: DateTime<Utc>) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO execution_results (arguments, started_at) VALUES (?1, ?2)",
            params![serde_json::to_string(arguments)?, timestamp(at)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_execution(
        &mut self,
        id: i64,
        error: Option<&str>,
        result: &Value,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE execution_results SET ended_at = ?1, error = ?2, result = ?3 WHERE id = ?4",
            params![timestamp(at), error, serde_json::to_string(result)?, id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("Execution {}", id)));
        }
        Ok(())
    }

    fn get_execution(&self, id: i64) -> StorageResult<ExecutionRecord> {
        self.conn
            .query_row(
                "SELECT id, arguments, started_at, ended_at, error, result
                 FROM execution_results WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ExecutionRecord {
                        id: row.get(0)?,
                        arguments: json_column(row, 1)?,
                        started_at: timestamp_column(row, 2)?,
                        ended_at: optional_timestamp_column(row, 3)?,
                        error: row.get(4)?,
                        result: optional_json_column(row, 5)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("Execution {}", id)))
    }
}

/// Filter row before its JSON members are decoded
struct RawFilter {
    network_key: String,
    key: String,
    description: Option<String>,
    query: String,
    sort: String,
}

impl RawFilter {
    fn into_filter(self) -> StorageResult<Filter> {
        Filter::from_parts(
            &self.network_key,
            &self.key,
            self.description.clone(),
            &self.query,
            &self.sort,
        )
        .map_err(|e| StorageError::InvalidFilter {
            filter: format!("{}:{}", self.network_key, self.key),
            message: e.to_string(),
        })
    }
}

fn raw_filter_from_row(row: &Row) -> rusqlite::Result<RawFilter> {
    Ok(RawFilter {
        network_key: row.get(0)?,
        key: row.get(1)?,
        description: row.get(2)?,
        query: row.get(3)?,
        sort: row.get(4)?,
    })
}

fn item_from_row(row: &Row) -> rusqlite::Result<Item> {
    Ok(Item {
        identifier: row.get(0)?,
        network_key: row.get(1)?,
        url: row.get(2)?,
        external_id: row.get(3)?,
        discovered_at: timestamp_column(row, 4)?,
        last_discovered: timestamp_column(row, 5)?,
        last_checked_at: optional_timestamp_column(row, 6)?,
        last_updated: optional_timestamp_column(row, 7)?,
        deleted_at: optional_timestamp_column(row, 8)?,
        state: ItemState::from_db_string(&row.get::<_, String>(9)?).unwrap_or(ItemState::Error),
        data: optional_json_column(row, 10)?,
        error: row.get(11)?,
        history: Vec::new(),
    })
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_column_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_column_timestamp(idx, &raw)
}

fn optional_timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_column_timestamp(idx, &r)).transpose()
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn optional_json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| serde_json::from_str(&r).map_err(|e| conversion_error(idx, e)))
        .transpose()
}
