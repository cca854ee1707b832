//! Item discovery
//!
//! Turns discovered links into items. The identifier is derived from the
//! external id when there is one, from the url otherwise, so the same listing
//! always maps to the same item.

use crate::model::NewItem;
use crate::storage::{with_storage, SharedStorage};
use crate::{Result, TidewatchError};
use chrono::Utc;
use sha2::{Digest, Sha256};

/// Hex characters kept from the SHA-256 digest (96 bits)
const IDENTIFIER_LEN: usize = 24;

/// Derives the item identifier for a url / external id pair
///
/// Returns `None` when neither is given.
pub fn item_identifier(url: Option<&str>, external_id: Option<&str>) -> Option<String> {
    let key = external_id.or(url)?;
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    Some(digest[..IDENTIFIER_LEN].to_string())
}

/// Records discovered links for one network
#[derive(Clone)]
pub struct DiscoveryService {
    storage: SharedStorage,
    network_key: String,
}

impl DiscoveryService {
    pub fn new(storage: SharedStorage, network_key: impl Into<String>) -> Self {
        Self {
            storage,
            network_key: network_key.into(),
        }
    }

    pub fn network_key(&self) -> &str {
        &self.network_key
    }

    /// Records a link, returning `true` if it created a new item
    ///
    /// Known items only get their `last_discovered` refreshed. The check and
    /// the write happen in a single storage statement.
    pub fn discover(&self, url: Option<&str>, external_id: Option<&str>) -> Result<bool> {
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        let external_id = external_id.map(str::trim).filter(|id| !id.is_empty());

        let identifier = item_identifier(url, external_id).ok_or_else(|| {
            TidewatchError::Driver("Discovered link has neither url nor external id".to_string())
        })?;

        let item = NewItem {
            identifier,
            network_key: self.network_key.clone(),
            url: url.map(str::to_string),
            external_id: external_id.map(str::to_string),
            discovered_at: Utc::now(),
        };

        let is_new = with_storage(&self.storage, |storage| storage.discover_item(&item))?;
        if is_new {
            tracing::info!(
                "New item discovered: {}",
                item.external_id.as_deref().or(item.url.as_deref()).unwrap_or("")
            );
        }
        Ok(is_new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, SqliteStorage};

    fn service() -> (SharedStorage, DiscoveryService) {
        let storage = shared(SqliteStorage::open_in_memory().unwrap());
        let service = DiscoveryService::new(storage.clone(), "tucarro");
        (storage, service)
    }

    #[test]
    fn test_identifier_prefers_external_id() {
        let by_id = item_identifier(Some("https://a/1"), Some("MCO-1")).unwrap();
        assert_eq!(by_id, item_identifier(Some("https://b/other"), Some("MCO-1")).unwrap());
        assert_ne!(by_id, item_identifier(Some("https://a/1"), None).unwrap());
        assert_eq!(by_id.len(), IDENTIFIER_LEN);
        assert!(by_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(item_identifier(None, None), None);
    }

    #[test]
    fn test_discover_twice_keeps_one_item() {
        let (storage, service) = service();

        assert!(service.discover(Some("https://a/1"), None).unwrap());
        assert!(!service.discover(Some("https://a/1"), None).unwrap());

        let count = with_storage(&storage, |s| s.count_items(Some("tucarro"))).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_discover_by_external_id() {
        let (storage, service) = service();
        assert!(service.discover(None, Some("MCO-1")).unwrap());
        assert!(!service.discover(None, Some(" MCO-1 ")).unwrap());

        let identifier = item_identifier(None, Some("MCO-1")).unwrap();
        let item = with_storage(&storage, |s| s.get_item(&identifier))
            .unwrap()
            .unwrap();
        assert_eq!(item.external_id.as_deref(), Some("MCO-1"));
        assert_eq!(item.url, None);
        assert_eq!(item.network_key, "tucarro");
    }

    #[test]
    fn test_discover_without_key_fails() {
        let (_, service) = service();
        assert!(service.discover(Some("  "), None).is_err());
    }
}
