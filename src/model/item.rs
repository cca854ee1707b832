use crate::model::diff::Change;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle state of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Discovered, never extracted
    Created,
    /// Data extracted at least once
    Fetched,
    /// The listing answered 404; soft-deleted
    Removed,
    /// The extractor reported a semantic error
    Error,
}

impl ItemState {
    /// Converts the item state to its database representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Fetched => "fetched",
            Self::Removed => "removed",
            Self::Error => "error",
        }
    }

    /// Parses an item state from its database representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "fetched" => Some(Self::Fetched),
            "removed" => Some(Self::Removed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Removed items are never revived by extraction
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Removed)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// One entry of an item's change history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: DateTime<Utc>,
    pub changeset: Vec<Change>,
}

/// A tracked listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Deterministic key derived from the external id or the url
    pub identifier: String,
    /// Network whose driver discovered the item
    pub network_key: String,
    pub url: Option<String>,
    pub external_id: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub last_discovered: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub state: ItemState,
    pub data: Option<Value>,
    /// Last error reported by the extractor, cleared on the next update
    pub error: Option<String>,
    /// Append-only change history, oldest first
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Item {
    /// Label used in log lines: external id when present, identifier otherwise
    pub fn label(&self) -> &str {
        self.external_id.as_deref().unwrap_or(&self.identifier)
    }
}

/// Input of a discovery upsert
#[derive(Debug, Clone)]
pub struct NewItem {
    pub identifier: String,
    pub network_key: String,
    pub url: Option<String>,
    pub external_id: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_state_roundtrip() {
        for state in [
            ItemState::Created,
            ItemState::Fetched,
            ItemState::Removed,
            ItemState::Error,
        ] {
            assert_eq!(ItemState::from_db_string(state.to_db_string()), Some(state));
        }
        assert_eq!(ItemState::from_db_string("fecthed"), None);
    }

    #[test]
    fn test_item_state_serde_matches_db_string() {
        let json = serde_json::to_string(&ItemState::Removed).unwrap();
        assert_eq!(json, "\"removed\"");
    }

    #[test]
    fn test_only_removed_is_terminal() {
        assert!(ItemState::Removed.is_terminal());
        assert!(!ItemState::Error.is_terminal());
        assert!(!ItemState::Created.is_terminal());
    }
}
