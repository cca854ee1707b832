//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Tidewatch database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Sites whose listings are tracked
CREATE TABLE IF NOT EXISTS networks (
    key TEXT PRIMARY KEY,
    configuration TEXT
);

-- Named item selections
CREATE TABLE IF NOT EXISTS filters (
    network_key TEXT NOT NULL,
    key TEXT NOT NULL,
    description TEXT,
    query TEXT NOT NULL DEFAULT '{}',
    sort TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (network_key, key)
);

-- Discovered listings
CREATE TABLE IF NOT EXISTS items (
    identifier TEXT PRIMARY KEY,
    network_key TEXT NOT NULL,
    url TEXT,
    external_id TEXT,
    discovered_at TEXT NOT NULL,
    last_discovered TEXT NOT NULL,
    last_checked_at TEXT,
    last_updated TEXT,
    deleted_at TEXT,
    state TEXT NOT NULL,
    data TEXT,
    error TEXT,
    discovery_count INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_items_network ON items(network_key);
CREATE INDEX IF NOT EXISTS idx_items_state ON items(state);
CREATE INDEX IF NOT EXISTS idx_items_external_id ON items(external_id);

-- Append-only change history
CREATE TABLE IF NOT EXISTS item_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL REFERENCES items(identifier),
    date TEXT NOT NULL,
    changeset TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_item_history_item ON item_history(identifier);

-- Per-explorer options, cache and checkpoint
CREATE TABLE IF NOT EXISTS explorer_configs (
    network_key TEXT NOT NULL,
    explorer_key TEXT NOT NULL,
    configuration TEXT NOT NULL DEFAULT '{}',
    cache TEXT NOT NULL DEFAULT '{}',
    last_run TEXT,
    PRIMARY KEY (network_key, explorer_key)
);

-- Outcome of each explorer run
CREATE TABLE IF NOT EXISTS explorer_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    network_key TEXT NOT NULL,
    explorer_key TEXT NOT NULL,
    status TEXT NOT NULL,
    date TEXT NOT NULL,
    stats TEXT NOT NULL,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_explorer_results_key ON explorer_results(network_key, explorer_key);

-- Audit trail of executions
CREATE TABLE IF NOT EXISTS execution_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    arguments TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    error TEXT,
    result TEXT
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
