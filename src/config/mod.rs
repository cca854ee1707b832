//! Configuration module for Tidewatch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section has defaults, so a missing file is not an error for the binary.
//!
//! # Example
//!
//! ```no_run
//! use tidewatch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("tidewatch.toml")).unwrap();
//! println!("Items per extraction page: {}", config.extraction.default_page_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, ExplorationConfig, ExtractionConfig, HttpConfig, StorageConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
