//! Driver registry and the built-in configurable drivers
//!
//! Drivers are looked up by `(network, key)`. Registrations under the
//! wildcard network `*` serve every network that has no exact match.

mod catalog;
mod listing;
mod selector;

pub use catalog::CatalogExplorer;
pub use listing::ListingExplorer;
pub use selector::SelectorExtractor;

use crate::explore::Explorer;
use crate::extract::Extractor;
use crate::{Result, TidewatchError};
use std::collections::HashMap;
use std::sync::Arc;

/// Network key matching every network
pub const ANY_NETWORK: &str = "*";

pub type ExplorerFactory = Arc<dyn Fn() -> Box<dyn Explorer> + Send + Sync>;
pub type ExtractorFactory = Arc<dyn Fn() -> Box<dyn Extractor> + Send + Sync>;

/// Static mapping from driver keys to driver factories
#[derive(Default, Clone)]
pub struct DriverRegistry {
    explorers: HashMap<(String, String), ExplorerFactory>,
    extractors: HashMap<(String, String), ExtractorFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the configuration driven drivers for every network
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_explorer(ANY_NETWORK, "default", || Box::new(ListingExplorer));
        registry.register_explorer(ANY_NETWORK, "today", || Box::new(ListingExplorer));
        registry.register_explorer(ANY_NETWORK, "all", || Box::new(CatalogExplorer));
        registry.register_extractor(ANY_NETWORK, "default", || Box::new(SelectorExtractor));
        registry
    }

    pub fn register_explorer<F>(&mut self, network: &str, key: &str, factory: F)
    where
        F: Fn() -> Box<dyn Explorer> + Send + Sync + 'static,
    {
        self.explorers
            .insert((network.to_string(), key.to_string()), Arc::new(factory));
    }

    pub fn register_extractor<F>(&mut self, network: &str, key: &str, factory: F)
    where
        F: Fn() -> Box<dyn Extractor> + Send + Sync + 'static,
    {
        self.extractors
            .insert((network.to_string(), key.to_string()), Arc::new(factory));
    }

    pub fn explorer(&self, network: &str, key: &str) -> Result<Box<dyn Explorer>> {
        lookup(&self.explorers, network, key)
            .map(|factory| factory())
            .ok_or_else(|| not_found("explorer", network, key))
    }

    pub fn extractor(&self, network: &str, key: &str) -> Result<Box<dyn Extractor>> {
        lookup(&self.extractors, network, key)
            .map(|factory| factory())
            .ok_or_else(|| not_found("extractor", network, key))
    }
}

fn lookup<'a, T>(
    factories: &'a HashMap<(String, String), T>,
    network: &str,
    key: &str,
) -> Option<&'a T> {
    factories
        .get(&(network.to_string(), key.to_string()))
        .or_else(|| factories.get(&(ANY_NETWORK.to_string(), key.to_string())))
}

fn not_found(kind: &'static str, network: &str, key: &str) -> TidewatchError {
    TidewatchError::DriverNotFound {
        kind,
        network: network.to_string(),
        key: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explore::ExplorationContext;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Explorer for Noop {
        async fn explore(&self, _ctx: &mut ExplorationContext) -> Result<()> {
            Err(TidewatchError::Driver("noop".to_string()))
        }
    }

    #[test]
    fn test_builtin_serves_any_network() {
        let registry = DriverRegistry::builtin();
        assert!(registry.explorer("tucarro", "today").is_ok());
        assert!(registry.explorer("other", "all").is_ok());
        assert!(registry.extractor("tucarro", "default").is_ok());
    }

    #[test]
    fn test_unknown_driver() {
        let registry = DriverRegistry::builtin();
        assert!(matches!(
            registry.explorer("tucarro", "weekly"),
            Err(TidewatchError::DriverNotFound { kind: "explorer", .. })
        ));
        assert!(matches!(
            registry.extractor("tucarro", "custom"),
            Err(TidewatchError::DriverNotFound { kind: "extractor", .. })
        ));
    }

    #[test]
    fn test_exact_registration_wins() {
        let mut registry = DriverRegistry::builtin();
        registry.register_explorer("tucarro", "today", || Box::new(Noop));

        assert!(registry.explorer("tucarro", "today").is_ok());
        assert!(registry.explorer("other", "today").is_ok());
        assert_eq!(registry.explorers.len(), 4);
    }
}
