use crate::model::options::Options;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A cached value owned by one explorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub value: Value,
    pub cached_at: DateTime<Utc>,
    pub last_hit: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: Value, now: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at: now,
            last_hit: now,
        }
    }

    /// An entry is expired once strictly more than `ttl` has elapsed
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.cached_at) > ttl
    }
}

/// TTL cache persisted with the explorer configuration
///
/// Expired entries are purged lazily, when a read finds them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live value for `key`, deleting the entry if it expired
    pub fn get(&mut self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Option<&Value> {
        let expired = self.entries.get(key)?.is_expired(ttl, now);
        if expired {
            self.entries.remove(key);
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.last_hit = now;
        Some(&entry.value)
    }

    pub fn contains(&mut self, key: &str, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.get(key, ttl, now).is_some()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Value, now: DateTime<Utc>) {
        self.entries.insert(key.into(), CacheEntry::new(value, now));
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Raw entry access, without expiry checks
    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Start/end markers and resume cursor of the most recent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_vars: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LastRun {
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: at,
            ended_at: None,
            state_vars: None,
            error: None,
        }
    }

    /// The run never finished its walk: it crashed (no end marker) or failed
    pub fn is_incomplete(&self) -> bool {
        self.ended_at.is_none() || self.error.is_some()
    }
}

/// Persistent per-explorer state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerRunConfig {
    pub network_key: String,
    pub explorer_key: String,
    #[serde(default)]
    pub configuration: Options,
    #[serde(default)]
    pub cache: RunCache,
    #[serde(default)]
    pub last_run: Option<LastRun>,
}

impl ExplorerRunConfig {
    pub fn new(network_key: impl Into<String>, explorer_key: impl Into<String>) -> Self {
        Self {
            network_key: network_key.into(),
            explorer_key: explorer_key.into(),
            configuration: Options::default(),
            cache: RunCache::default(),
            last_run: None,
        }
    }

    pub fn with_configuration(mut self, configuration: Options) -> Self {
        self.configuration = configuration;
        self
    }
}

/// Final status of an explorer run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Immutable record appended at the end of every explorer run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerRunResult {
    pub network_key: String,
    pub explorer_key: String,
    pub status: RunStatus,
    pub date: DateTime<Utc>,
    pub stats: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Audit record of a CLI level execution (extraction runs)
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub id: i64,
    pub arguments: Value,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<Value>,
}
