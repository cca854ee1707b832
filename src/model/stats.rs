use std::collections::BTreeMap;

/// Well-known counter names
pub mod keys {
    /// Every link handed to the discovery service
    pub const DISCOVERED_ITEMS: &str = "discoveredItems";
    /// Links that created a new item
    pub const NEW_ITEMS: &str = "newItems";
    /// Consecutive links that were already known
    pub const REPEAT_STRIKE: &str = "repeatStrike";
    /// Result pages fetched by a traversal
    pub const PAGES_VISITED: &str = "pagesVisited";

    pub const ITEMS_PROCESSED: &str = "itemsProcessed";
    pub const ITEMS_UPDATED: &str = "itemsUpdated";
    pub const ITEMS_UNCHANGED: &str = "itemsUnchanged";
    pub const ITEMS_REMOVED: &str = "itemsRemoved";
    pub const ITEMS_ERRORED: &str = "itemsErrored";
    pub const ITEMS_SKIPPED: &str = "itemsSkipped";
    pub const SNAPSHOTS_SAVED: &str = "snapshotsSaved";
    pub const ASSETS_SAVED: &str = "assetsSaved";
    pub const ASSETS_FAILED: &str = "assetsFailed";
}

/// Named integer counters for a single run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    counters: BTreeMap<String, i64>,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increase(&mut self, counter: &str) {
        *self.counters.entry(counter.to_string()).or_insert(0) += 1;
    }

    pub fn decrease(&mut self, counter: &str) {
        *self.counters.entry(counter.to_string()).or_insert(0) -= 1;
    }

    pub fn reset(&mut self, counter: &str) {
        self.counters.insert(counter.to_string(), 0);
    }

    /// Current value; counters never touched read as zero
    pub fn get(&self, counter: &str) -> i64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.counters.clone()
    }
}
