//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use tidewatch::config::{ExplorationConfig, ExtractionConfig, HttpConfig};
use tidewatch::drivers::DriverRegistry;
use tidewatch::storage::{shared, SharedStorage};
use tidewatch::{FetchClient, SqliteStorage};
use wiremock::ResponseTemplate;

pub fn memory_storage() -> SharedStorage {
    shared(SqliteStorage::open_in_memory().unwrap())
}

pub fn client() -> FetchClient {
    FetchClient::new(&HttpConfig::default()).unwrap()
}

pub fn registry() -> Arc<DriverRegistry> {
    Arc::new(DriverRegistry::builtin())
}

/// Page retries without delay
pub fn exploration_config() -> ExplorationConfig {
    ExplorationConfig {
        page_retry_attempts: 3,
        page_retry_delay_ms: 0,
        default_max_repeat_strike: 100,
    }
}

/// Item retries without delay
pub fn extraction_config() -> ExtractionConfig {
    ExtractionConfig {
        max_item_attempts: 5,
        retry_delay_ms: 0,
        default_page_size: 10,
    }
}

pub fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body.into())
}
