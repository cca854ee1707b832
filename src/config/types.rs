use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Tidewatch
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub exploration: ExplorationConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

/// Where items, run state and snapshot archives live
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Root directory for scratch space and archived snapshots
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: String,
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            data_dir: default_data_dir(),
        }
    }
}

/// HTTP client identity and transport settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "desktop-user-agent", default = "default_desktop_agent")]
    pub desktop_user_agent: String,

    #[serde(rename = "mobile-user-agent", default = "default_mobile_agent")]
    pub mobile_user_agent: String,

    #[serde(rename = "accept-language", default = "default_accept_language")]
    pub accept_language: String,

    /// Optional proxy every request goes through unless it asks to skip it
    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            desktop_user_agent: default_desktop_agent(),
            mobile_user_agent: default_mobile_agent(),
            accept_language: default_accept_language(),
            proxy: None,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Settings shared by every explorer run
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorationConfig {
    /// Attempts per result page before the traversal gives up
    #[serde(rename = "page-retry-attempts", default = "default_page_retry_attempts")]
    pub page_retry_attempts: u32,

    /// Fixed delay between result page attempts (milliseconds)
    #[serde(rename = "page-retry-delay-ms", default = "default_page_retry_delay_ms")]
    pub page_retry_delay_ms: u64,

    /// Repeat strike threshold used when an explorer does not configure one
    #[serde(rename = "default-max-repeat-strike", default = "default_max_repeat_strike")]
    pub default_max_repeat_strike: u64,
}

impl ExplorationConfig {
    pub fn page_retry_delay(&self) -> Duration {
        Duration::from_millis(self.page_retry_delay_ms)
    }
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            page_retry_attempts: default_page_retry_attempts(),
            page_retry_delay_ms: default_page_retry_delay_ms(),
            default_max_repeat_strike: default_max_repeat_strike(),
        }
    }
}

/// Settings for the extraction engine
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Combined budget of fetch attempts and refetch requests per item
    #[serde(rename = "max-item-attempts", default = "default_max_item_attempts")]
    pub max_item_attempts: u32,

    /// Delay between attempts on the same item (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Items per page when the network does not configure one
    #[serde(rename = "default-page-size", default = "default_page_size")]
    pub default_page_size: u32,
}

impl ExtractionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_item_attempts: default_max_item_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            default_page_size: default_page_size(),
        }
    }
}

fn default_database_path() -> String {
    "./data/tidewatch.db".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_desktop_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36".to_string()
}

fn default_mobile_agent() -> String {
    "Mozilla/5.0 (Linux; Android 6.0.1; Moto G (4)) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/95.0.4638.69 Mobile Safari/537.36".to_string()
}

fn default_accept_language() -> String {
    "es-US,es-419;q=0.9,es;q=0.8".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_page_retry_attempts() -> u32 {
    3
}

fn default_page_retry_delay_ms() -> u64 {
    2000
}

fn default_max_repeat_strike() -> u64 {
    100
}

fn default_max_item_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    3000
}

fn default_page_size() -> u32 {
    10
}
