//! Seed documents
//!
//! A seed is a TOML file describing networks, explorer run configurations and
//! filters. Applying it upserts every entry; explorer caches and checkpoints
//! survive a re-seed.
//!
//! ```toml
//! [[networks]]
//! key = "tucarro"
//! [networks.configuration]
//! urlTemplate = "https://articulo.example.com/$externalId-_JM"
//!
//! [[explorers]]
//! network = "tucarro"
//! key = "today"
//! [explorers.configuration]
//! baseUrl = "https://cars.example.com/_PublishedToday_YES"
//! itemSelector = ".ui-search-row a"
//!
//! [[filters]]
//! network = "tucarro"
//! key = "stale"
//! description = "Items not checked today"
//! query = { states = ["created", "fetched"], notCheckedWithinHours = 24 }
//! ```

use crate::model::{ExplorerRunConfig, Filter, ItemQuery, ItemSort, Network, Options};
use crate::storage::{with_storage, SharedStorage};
use crate::{ConfigError, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedDocument {
    #[serde(default)]
    pub networks: Vec<Network>,
    #[serde(default)]
    pub explorers: Vec<ExplorerSeed>,
    #[serde(default)]
    pub filters: Vec<FilterSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerSeed {
    pub network: String,
    pub key: String,
    #[serde(default)]
    pub configuration: Options,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterSeed {
    pub network: String,
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub query: ItemQuery,
    #[serde(default)]
    pub sort: ItemSort,
}

/// Counts of upserted records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub networks: usize,
    pub explorers: usize,
    pub filters: usize,
}

impl SeedDocument {
    pub fn parse(content: &str) -> std::result::Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Upserts every record of the document
    pub fn apply(&self, storage: &SharedStorage) -> Result<SeedSummary> {
        with_storage(storage, |storage| {
            for network in &self.networks {
                storage.upsert_network(network)?;
            }
            for explorer in &self.explorers {
                let config = ExplorerRunConfig::new(&explorer.network, &explorer.key)
                    .with_configuration(explorer.configuration.clone());
                storage.upsert_explorer_config(&config)?;
            }
            for seed in &self.filters {
                storage.upsert_filter(&Filter {
                    network_key: seed.network.clone(),
                    key: seed.key.clone(),
                    description: seed.description.clone(),
                    query: seed.query.clone(),
                    sort: seed.sort.clone(),
                })?;
            }
            Ok(())
        })?;

        Ok(SeedSummary {
            networks: self.networks.len(),
            explorers: self.explorers.len(),
            filters: self.filters.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemState, SortField};
    use crate::storage::{shared, SqliteStorage};
    use serde_json::json;

    const SEED: &str = r#"
[[networks]]
key = "tucarro"
[networks.configuration]
urlTemplate = "https://articulo.example.com/$externalId-_JM"
extractPageSize = 20
fields = { title = "h1" }

[[explorers]]
network = "tucarro"
key = "today"
[explorers.configuration]
baseUrl = "https://cars.example.com/today"
maxRepeatCountStrike = 10

[[filters]]
network = "tucarro"
key = "stale"
description = "Items not checked today"
query = { states = ["created", "fetched"], notCheckedWithinHours = 24 }
sort = { field = "lastCheckedAt" }
"#;

    #[test]
    fn test_parse_seed() {
        let seed = SeedDocument::parse(SEED).unwrap();
        assert_eq!(seed.networks[0].extract_page_size(), Some(20));
        assert_eq!(
            seed.networks[0].options().get_value("fields"),
            Some(&json!({"title": "h1"}))
        );
        assert_eq!(seed.explorers[0].configuration.get_u64("maxRepeatCountStrike", 0), 10);
        assert_eq!(
            seed.filters[0].query.states,
            vec![ItemState::Created, ItemState::Fetched]
        );
        assert_eq!(seed.filters[0].sort.field, SortField::LastCheckedAt);
    }

    #[test]
    fn test_apply_seed() {
        let storage = shared(SqliteStorage::open_in_memory().unwrap());
        let summary = SeedDocument::parse(SEED).unwrap().apply(&storage).unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                networks: 1,
                explorers: 1,
                filters: 1
            }
        );

        let filters = with_storage(&storage, |s| s.list_filters()).unwrap();
        assert_eq!(filters.len(), 1);
        let explorer = with_storage(&storage, |s| s.get_explorer_config("tucarro", "today"))
            .unwrap()
            .unwrap();
        assert_eq!(
            explorer.configuration.get_str("baseUrl"),
            Some("https://cars.example.com/today")
        );
    }

    #[test]
    fn test_unknown_query_member_is_rejected() {
        let seed = r#"
[[filters]]
network = "n"
key = "k"
query = { price = 1 }
"#;
        assert!(SeedDocument::parse(seed).is_err());
    }
}
