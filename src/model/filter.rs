use crate::model::item::ItemState;
use serde::{Deserialize, Serialize};

/// Declarative selection over the items of one network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub network_key: String,
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub query: ItemQuery,
    #[serde(default)]
    pub sort: ItemSort,
}

/// Conditions an item must meet; absent members do not constrain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ItemQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<ItemState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Items never checked, or last checked longer ago than this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_checked_within_hours: Option<i64>,
}

/// Item ordering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ItemSort {
    #[serde(default)]
    pub field: SortField,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    DiscoveredAt,
    LastDiscovered,
    LastCheckedAt,
    LastUpdated,
    Identifier,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::DiscoveredAt => "discovered_at",
            Self::LastDiscovered => "last_discovered",
            Self::LastCheckedAt => "last_checked_at",
            Self::LastUpdated => "last_updated",
            Self::Identifier => "identifier",
        }
    }
}

impl Filter {
    /// Builds a filter from its stored text form
    ///
    /// Empty query or sort text means "no constraint" / default ordering.
    pub fn from_parts(
        network_key: &str,
        key: &str,
        description: Option<String>,
        query: &str,
        sort: &str,
    ) -> Result<Self, serde_json::Error> {
        let query = if query.trim().is_empty() {
            ItemQuery::default()
        } else {
            serde_json::from_str(query)?
        };
        let sort = if sort.trim().is_empty() {
            ItemSort::default()
        } else {
            serde_json::from_str(sort)?
        };
        Ok(Self {
            network_key: network_key.to_string(),
            key: key.to_string(),
            description,
            query,
            sort,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts() {
        let filter = Filter::from_parts(
            "tucarro",
            "stale",
            Some("Items not checked today".to_string()),
            r#"{"states":["created","fetched"],"notCheckedWithinHours":24}"#,
            r#"{"field":"lastCheckedAt"}"#,
        )
        .unwrap();

        assert_eq!(filter.query.states, vec![ItemState::Created, ItemState::Fetched]);
        assert_eq!(filter.query.not_checked_within_hours, Some(24));
        assert_eq!(filter.sort.field, SortField::LastCheckedAt);
        assert!(!filter.sort.descending);
    }

    #[test]
    fn test_empty_parts_use_defaults() {
        let filter = Filter::from_parts("n", "all", None, "", " ").unwrap();
        assert_eq!(filter.query, ItemQuery::default());
        assert_eq!(filter.sort.field, SortField::DiscoveredAt);
    }

    #[test]
    fn test_malformed_query_is_rejected() {
        assert!(Filter::from_parts("n", "k", None, "{not json", "").is_err());
        assert!(Filter::from_parts("n", "k", None, r#"{"price":{"$gt":1}}"#, "").is_err());
        assert!(Filter::from_parts("n", "k", None, "", r#"{"field":"price"}"#).is_err());
    }
}
