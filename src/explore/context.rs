//! Per-run exploration context
//!
//! One context is built per explorer run and handed to the driver by
//! mutable reference. It owns the run's TTL cache, counters, ephemeral values
//! and checkpoint, and persists the cache and checkpoint as they change.

use crate::config::ExplorationConfig;
use crate::discovery::DiscoveryService;
use crate::fetch::{FetchClient, RetryPolicy};
use crate::model::{keys, ExplorerRunConfig, LastRun, Options, RunCache, RunStatistics};
use crate::storage::{with_storage, SharedStorage};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Default TTL for cache reads, in hours
pub const DEFAULT_CACHE_TTL_HOURS: i64 = 24;

/// Configuration key holding the repeat strike threshold
pub const MAX_REPEAT_STRIKE_KEY: &str = "maxRepeatCountStrike";

/// State shared between the exploration engine and an explorer driver
pub struct ExplorationContext {
    storage: SharedStorage,
    discovery: DiscoveryService,
    client: FetchClient,
    run_config: ExplorerRunConfig,
    /// `last_run` as it was before this run wrote its start marker
    previous_run: Option<LastRun>,
    stats: RunStatistics,
    values: HashMap<String, Value>,
    page_retry: RetryPolicy,
    default_max_repeat_strike: u64,
}

impl ExplorationContext {
    pub fn new(
        storage: SharedStorage,
        client: FetchClient,
        run_config: ExplorerRunConfig,
        config: &ExplorationConfig,
    ) -> Self {
        let discovery = DiscoveryService::new(storage.clone(), run_config.network_key.clone());
        let previous_run = run_config.last_run.clone();

        Self {
            storage,
            discovery,
            client,
            run_config,
            previous_run,
            stats: RunStatistics::new(),
            values: HashMap::new(),
            page_retry: RetryPolicy::fixed(config.page_retry_attempts, config.page_retry_delay()),
            default_max_repeat_strike: config.default_max_repeat_strike,
        }
    }

    pub fn network_key(&self) -> &str {
        &self.run_config.network_key
    }

    pub fn explorer_key(&self) -> &str {
        &self.run_config.explorer_key
    }

    pub fn client(&self) -> &FetchClient {
        &self.client
    }

    /// Retry policy for result page fetches
    pub fn page_retry(&self) -> RetryPolicy {
        self.page_retry
    }

    // ===== Configuration =====

    /// Driver options of this explorer
    pub fn options(&self) -> &Options {
        &self.run_config.configuration
    }

    /// Typed configuration value, `default` when absent or of another type
    pub fn get_configuration<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.run_config.configuration.get_or(key, default)
    }

    /// Repeat strike threshold: explorer option, then the global default
    pub fn max_repeat_strike(&self) -> u64 {
        self.get_configuration(MAX_REPEAT_STRIKE_KEY, self.default_max_repeat_strike)
    }

    // ===== Cache =====

    pub fn is_cached(&mut self, key: &str, ttl_hours: i64) -> bool {
        self.is_cached_at(key, ttl_hours, Utc::now())
    }

    pub fn is_cached_at(&mut self, key: &str, ttl_hours: i64, now: DateTime<Utc>) -> bool {
        self.run_config
            .cache
            .contains(key, Duration::hours(ttl_hours), now)
    }

    /// Live cached value; an expired entry is dropped by the read
    pub fn get_cached(&mut self, key: &str, ttl_hours: i64) -> Option<Value> {
        self.get_cached_at(key, ttl_hours, Utc::now())
    }

    pub fn get_cached_at(&mut self, key: &str, ttl_hours: i64, now: DateTime<Utc>) -> Option<Value> {
        self.run_config
            .cache
            .get(key, Duration::hours(ttl_hours), now)
            .cloned()
    }

    /// Live cached value decoded as `T`; values of another shape are misses
    pub fn get_cached_as<T: DeserializeOwned>(&mut self, key: &str, ttl_hours: i64) -> Option<T> {
        let value = self.get_cached(key, ttl_hours)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!("Ignoring cached value {} of unexpected shape: {}", key, e);
                None
            }
        }
    }

    /// Stores `value` and persists the whole cache before returning
    pub fn cache_value(&mut self, key: &str, value: Value) -> Result<()> {
        self.cache_value_at(key, value, Utc::now())
    }

    pub fn cache_value_at(&mut self, key: &str, value: Value, now: DateTime<Utc>) -> Result<()> {
        self.run_config.cache.put(key, value, now);
        self.persist_cache()
    }

    pub fn invalidate_cached(&mut self, key: &str) -> Result<()> {
        if self.run_config.cache.remove(key).is_some() {
            self.persist_cache()?;
        }
        Ok(())
    }

    pub fn cache(&self) -> &RunCache {
        &self.run_config.cache
    }

    pub(crate) fn persist_cache(&self) -> Result<()> {
        let (network, explorer) = (self.network_key(), self.explorer_key());
        let cache = &self.run_config.cache;
        with_storage(&self.storage, |storage| {
            storage.save_explorer_cache(network, explorer, cache)
        })?;
        Ok(())
    }

    // ===== Discovery =====

    /// Registers a discovered link and updates the discovery counters
    ///
    /// A new item resets the repeat strike; a known one extends it.
    pub fn add_item_link(&mut self, url: Option<&str>, external_id: Option<&str>) -> Result<bool> {
        let is_new = self.discovery.discover(url, external_id)?;

        self.stats.increase(keys::DISCOVERED_ITEMS);
        if is_new {
            self.stats.increase(keys::NEW_ITEMS);
            self.stats.reset(keys::REPEAT_STRIKE);
        } else {
            self.stats.increase(keys::REPEAT_STRIKE);
        }

        Ok(is_new)
    }

    // ===== Ephemeral values and counters =====

    /// Stores a value for the rest of this run only
    pub fn put_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_stats(&self) -> BTreeMap<String, i64> {
        self.stats.snapshot()
    }

    pub fn stats(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut RunStatistics {
        &mut self.stats
    }

    // ===== Checkpoint =====

    /// The run recorded before this one started
    pub fn previous_run(&self) -> Option<&LastRun> {
        self.previous_run.as_ref()
    }

    /// Checkpoint left by a previous run that did not finish
    pub fn resume_state(&self) -> Option<&Value> {
        self.previous_run
            .as_ref()
            .filter(|run| run.is_incomplete())
            .and_then(|run| run.state_vars.as_ref())
    }

    /// Persists an opaque resume cursor into `last_run.state_vars`
    pub fn save_state_vars(&mut self, state: Value) -> Result<()> {
        let last_run = self
            .run_config
            .last_run
            .get_or_insert_with(|| LastRun::started(Utc::now()));
        last_run.state_vars = Some(state);
        self.persist_last_run()
    }

    pub fn last_run(&self) -> Option<&LastRun> {
        self.run_config.last_run.as_ref()
    }

    pub(crate) fn set_last_run(&mut self, last_run: LastRun) -> Result<()> {
        self.run_config.last_run = Some(last_run);
        self.persist_last_run()
    }

    fn persist_last_run(&self) -> Result<()> {
        if let Some(last_run) = &self.run_config.last_run {
            let (network, explorer) = (self.network_key(), self.explorer_key());
            with_storage(&self.storage, |storage| {
                storage.save_last_run(network, explorer, last_run)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::storage::{shared, SqliteStorage};
    use chrono::TimeZone;
    use serde_json::json;

    fn context(configuration: Options) -> (SharedStorage, ExplorationContext) {
        let storage = shared(SqliteStorage::open_in_memory().unwrap());
        let run_config = ExplorerRunConfig::new("tucarro", "today").with_configuration(configuration);
        with_storage(&storage, |s| s.upsert_explorer_config(&run_config)).unwrap();

        let client = FetchClient::new(&HttpConfig::default()).unwrap();
        let ctx = ExplorationContext::new(
            storage.clone(),
            client,
            run_config,
            &ExplorationConfig::default(),
        );
        (storage, ctx)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_get_configuration_with_default() {
        let mut options = Options::new();
        options.insert("baseUrl", json!("https://cars.example.com"));
        let (_, ctx) = context(options);

        assert_eq!(
            ctx.get_configuration("baseUrl", String::new()),
            "https://cars.example.com"
        );
        assert_eq!(ctx.get_configuration("pages", 7u32), 7);
        assert_eq!(ctx.max_repeat_strike(), 100);
    }

    #[test]
    fn test_cache_ttl() {
        let (_, mut ctx) = context(Options::new());
        ctx.cache_value_at("brands", json!(["B1"]), t0()).unwrap();

        let within = t0() + Duration::minutes(30);
        assert_eq!(ctx.get_cached_at("brands", 1, within), Some(json!(["B1"])));

        let after = t0() + Duration::minutes(61);
        assert_eq!(ctx.get_cached_at("brands", 1, after), None);
        assert!(ctx.cache().entry("brands").is_none());
    }

    #[test]
    fn test_cache_value_is_persisted_immediately() {
        let (storage, mut ctx) = context(Options::new());
        ctx.cache_value("models", json!([1, 2])).unwrap();

        let stored = with_storage(&storage, |s| s.get_explorer_config("tucarro", "today"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.cache.entry("models").unwrap().value, json!([1, 2]));

        ctx.invalidate_cached("models").unwrap();
        let stored = with_storage(&storage, |s| s.get_explorer_config("tucarro", "today"))
            .unwrap()
            .unwrap();
        assert!(stored.cache.is_empty());
    }

    #[test]
    fn test_get_cached_as_ignores_other_shapes() {
        let (_, mut ctx) = context(Options::new());
        ctx.cache_value("brands", json!({"not": "a list"})).unwrap();
        assert_eq!(ctx.get_cached_as::<Vec<String>>("brands", 24), None);
    }

    #[test]
    fn test_add_item_link_counters() {
        let (_, mut ctx) = context(Options::new());

        assert!(ctx.add_item_link(Some("https://a/1"), None).unwrap());
        assert!(!ctx.add_item_link(Some("https://a/1"), None).unwrap());
        assert!(!ctx.add_item_link(Some("https://a/1"), None).unwrap());
        assert_eq!(ctx.stats().get(keys::REPEAT_STRIKE), 2);

        assert!(ctx.add_item_link(None, Some("MCO-2")).unwrap());
        let stats = ctx.get_stats();
        assert_eq!(stats.get(keys::DISCOVERED_ITEMS), Some(&4));
        assert_eq!(stats.get(keys::NEW_ITEMS), Some(&2));
        assert_eq!(ctx.stats().get(keys::REPEAT_STRIKE), 0);
    }

    #[test]
    fn test_values_are_not_persisted() {
        let (storage, mut ctx) = context(Options::new());
        ctx.put_value("cursor", json!(3));
        assert_eq!(ctx.get_value("cursor"), Some(&json!(3)));

        let stored = with_storage(&storage, |s| s.get_explorer_config("tucarro", "today"))
            .unwrap()
            .unwrap();
        assert!(stored.cache.is_empty());
        assert!(stored.last_run.is_none());
    }

    #[test]
    fn test_save_state_vars() {
        let (storage, mut ctx) = context(Options::new());
        ctx.set_last_run(LastRun::started(t0())).unwrap();
        ctx.save_state_vars(json!({"brand": "B1", "model": "M1"}))
            .unwrap();

        let stored = with_storage(&storage, |s| s.get_explorer_config("tucarro", "today"))
            .unwrap()
            .unwrap();
        let last_run = stored.last_run.unwrap();
        assert_eq!(last_run.started_at, t0());
        assert_eq!(last_run.state_vars, Some(json!({"brand": "B1", "model": "M1"})));
        assert!(ctx.resume_state().is_none());
    }
}
