//! Tidewatch: a listing explorer and change tracker
//!
//! This crate discovers listing pages on external sites, keeps them as items,
//! and periodically re-fetches them to extract structured data, recording a
//! change history and raw snapshots of every successful fetch.

pub mod archive;
pub mod config;
pub mod discovery;
pub mod drivers;
pub mod explore;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod seed;
pub mod storage;

use thiserror::Error;

/// Main error type for Tidewatch operations
#[derive(Debug, Error)]
pub enum TidewatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid JSON received from {url}: {source}")]
    JsonParse {
        url: String,
        source: serde_json::Error,
    },

    #[error("HTML parse error for {url}: {message}")]
    HtmlParse { url: String, message: String },

    #[error("Invalid CSS selector '{0}'")]
    Selector(String),

    #[error("Unexpected status {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Network not found: {0}")]
    NetworkNotFound(String),

    #[error("Filter not found: {0}")]
    FilterNotFound(String),

    #[error("Explorer configuration not found: {network}:{explorer}")]
    ExplorerConfigNotFound { network: String, explorer: String },

    #[error("No {kind} driver registered for {network}:{key}")]
    DriverNotFound {
        kind: &'static str,
        network: String,
        key: String,
    },

    #[error("Invalid path '{0}', expected <network>:<key>")]
    InvalidPath(String),

    #[error("Unable to build url for network {0}: no url template configured")]
    MissingUrlTemplate(String),

    #[error("Item {identifier} has neither url nor external id")]
    UnaddressableItem { identifier: String },

    #[error("Item {identifier} still asked for a refetch after {attempts} attempts")]
    RefetchExhausted { identifier: String, attempts: u32 },

    #[error("Invalid run transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: explore::RunPhase,
        to: explore::RunPhase,
    },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TidewatchError {
    /// Missing networks, filters, explorers or run configurations.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::NetworkNotFound(_)
                | Self::FilterNotFound(_)
                | Self::ExplorerConfigNotFound { .. }
                | Self::DriverNotFound { .. }
                | Self::InvalidPath(_)
                | Self::MissingUrlTemplate(_)
        )
    }

    /// Network level faults (DNS, timeouts, refused connections).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Reqwest(_))
    }

    /// Responses whose shape signals an upstream format change.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedStatus { .. } | Self::JsonParse { .. } | Self::HtmlParse { .. }
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Tidewatch operations
pub type Result<T> = std::result::Result<T, TidewatchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use discovery::{item_identifier, DiscoveryService};
pub use explore::{ExplorationContext, ExplorationEngine, Explorer};
pub use extract::{ExtractedContent, ExtractionEngine, Extractor, UrlBuilder};
pub use fetch::{FetchClient, FetchOptions, HtmlPage, RetryPolicy};
pub use model::{Item, ItemState, Network, RunStatistics};
pub use storage::{SharedStorage, SqliteStorage, Storage};
