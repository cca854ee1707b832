use crate::config::types::{Config, ExplorationConfig, ExtractionConfig, HttpConfig, StorageConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_storage_config(&config.storage)?;
    validate_http_config(&config.http)?;
    validate_exploration_config(&config.exploration)?;
    validate_extraction_config(&config.extraction)?;
    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.data_dir.is_empty() {
        return Err(ConfigError::Validation(
            "data_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.desktop_user_agent.trim().is_empty() || config.mobile_user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user agents cannot be empty".to_string(),
        ));
    }

    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_exploration_config(config: &ExplorationConfig) -> Result<(), ConfigError> {
    if config.page_retry_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "page_retry_attempts must be >= 1, got {}",
            config.page_retry_attempts
        )));
    }

    Ok(())
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    if config.max_item_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_item_attempts must be >= 1, got {}",
            config.max_item_attempts
        )));
    }

    if config.default_page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "default_page_size must be >= 1, got {}",
            config.default_page_size
        )));
    }

    Ok(())
}
