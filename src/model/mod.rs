//! Data model for Tidewatch
//!
//! This module defines the records the engines read and write:
//!
//! - `Item`: a discovered listing together with its extracted data and history
//! - `ExplorerRunConfig`: per-explorer options, TTL cache and last run checkpoint
//! - `ExplorerRunResult`: immutable outcome of one explorer run
//! - `Network` / `Filter`: static descriptions of a site and of item selections
//! - `RunStatistics`: named counters reset per run
//! - `Options`: opaque driver configuration with typed accessors

mod diff;
mod explorer;
mod filter;
mod item;
mod network;
mod options;
mod stats;

pub use diff::{diff, Change, PathSegment};
pub use explorer::{
    CacheEntry, ExecutionRecord, ExplorerRunConfig, ExplorerRunResult, LastRun, RunCache,
    RunStatus,
};
pub use filter::{Filter, ItemQuery, ItemSort, SortField};
pub use item::{HistoryEntry, Item, ItemState, NewItem};
pub use network::{Network, NetworkConfiguration};
pub use options::Options;
pub use stats::{keys, RunStatistics};

use crate::TidewatchError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// A `<network>:<key>` reference, as used by `--explorer` and `--filter`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedKey {
    pub network: String,
    pub key: String,
}

impl QualifiedKey {
    pub fn new(network: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            key: key.into(),
        }
    }

    /// Parses `network:key`; both halves must be non-empty
    pub fn parse(path: &str) -> Result<Self, TidewatchError> {
        match path.split_once(':') {
            Some((network, key))
                if !network.trim().is_empty() && !key.trim().is_empty() && !key.contains(':') =>
            {
                Ok(Self::new(network.trim(), key.trim()))
            }
            _ => Err(TidewatchError::InvalidPath(path.to_string())),
        }
    }
}

impl fmt::Display for QualifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.key)
    }
}

/// Formats a timestamp the way it is persisted
///
/// Fixed millisecond precision with a `Z` suffix keeps lexical ordering equal
/// to chronological ordering.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_qualified_key() {
        let key = QualifiedKey::parse("mercadolibre:all").unwrap();
        assert_eq!(key.network, "mercadolibre");
        assert_eq!(key.key, "all");
        assert_eq!(key.to_string(), "mercadolibre:all");
    }

    #[test]
    fn test_parse_qualified_key_rejects_malformed() {
        for path in ["", "network", ":key", "network:", "a:b:c"] {
            assert!(
                matches!(QualifiedKey::parse(path), Err(TidewatchError::InvalidPath(_))),
                "{} should be rejected",
                path
            );
        }
    }

    #[test]
    fn test_timestamp_format_and_ordering() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 11, 2, 3, 4, 5).unwrap();

        assert_eq!(timestamp(early), "2024-01-02T03:04:05.000Z");
        assert!(timestamp(early) < timestamp(late));
    }
}
