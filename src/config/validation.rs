use crate::config::types::{
    Config, CrawlerConfig, RobotsConfig, SessionConfig, UserAgentConfig, MAX_ROBOTS_CACHE_HOURS,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_session_config(&config.session)?;
    validate_robots_config(&config.robots)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_seeds(config)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.storage_folder.trim().is_empty() {
        return Err(ConfigError::Validation(
            "storage_folder cannot be empty".to_string(),
        ));
    }

    if config.number_of_crawlers < 1 || config.number_of_crawlers > 256 {
        return Err(ConfigError::Validation(format!(
            "number_of_crawlers must be between 1 and 256, got {}",
            config.number_of_crawlers
        )));
    }

    if config.max_download_size == 0 {
        return Err(ConfigError::Validation(
            "max_download_size must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates monitor timing
fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    // A zero interval would turn the monitor into a busy loop
    if config.monitoring_delay == 0 {
        return Err(ConfigError::Validation(
            "monitoring_delay must be >= 1ms".to_string(),
        ));
    }

    Ok(())
}

/// Validates robots.txt settings
fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if !(0..=MAX_ROBOTS_CACHE_HOURS).contains(&config.cache_hours) {
        return Err(ConfigError::Validation(format!(
            "cache_hours must be between 0 and {}, got {}",
            MAX_ROBOTS_CACHE_HOURS, config.cache_hours
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates seed and seen-url entries
fn validate_seeds(config: &Config) -> Result<(), ConfigError> {
    for seed in &config.seeds {
        Url::parse(&seed.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed.url, e))
        })?;

        if matches!(seed.doc_id, Some(id) if id < 1) {
            return Err(ConfigError::Validation(format!(
                "Seed '{}' has a doc-id below 1",
                seed.url
            )));
        }
    }

    for seen in &config.seen_urls {
        if seen.doc_id < 1 {
            return Err(ConfigError::Validation(format!(
                "Seen URL '{}' has a doc-id below 1",
                seen.url
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
