use crate::config::types::{
    BanConfig, CatalogEntry, Config, FetcherConfig, HarvesterConfig, OriginConfig, OutputConfig,
};
use crate::url::validate_template;
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;

/// Longest politeness delay or back-off accepted, in seconds
const MAX_PAUSE_SECONDS: f64 = 3600.0;

/// Largest accepted night-mode multiplier
const MAX_NIGHT_MULTIPLIER: f64 = 10.0;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvester_config(&config.harvester)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_ban_config(&config.ban)?;
    validate_output_config(&config.output)?;
    validate_origins(&config.origins)?;
    validate_catalog(&config.catalog)?;
    Ok(())
}

/// Validates scheduler configuration
fn validate_harvester_config(config: &HarvesterConfig) -> Result<(), ConfigError> {
    if config.worker_count < 1 || config.worker_count > 64 {
        return Err(ConfigError::Validation(format!(
            "worker-count must be between 1 and 64, got {}",
            config.worker_count
        )));
    }

    if !config.min_delay_seconds.is_finite()
        || !config.max_delay_seconds.is_finite()
        || config.min_delay_seconds < 0.0
        || config.min_delay_seconds > config.max_delay_seconds
    {
        return Err(ConfigError::Validation(format!(
            "delays must satisfy 0 <= min-delay-seconds <= max-delay-seconds, got {} and {}",
            config.min_delay_seconds, config.max_delay_seconds
        )));
    }

    if config.max_delay_seconds > MAX_PAUSE_SECONDS {
        return Err(ConfigError::Validation(format!(
            "max-delay-seconds must be at most {}, got {}",
            MAX_PAUSE_SECONDS, config.max_delay_seconds
        )));
    }

    if config.requests_per_hour < 1 {
        return Err(ConfigError::Validation(
            "requests-per-hour must be >= 1".to_string(),
        ));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1".to_string(),
        ));
    }

    if config.checkpoint_interval_units < 1 {
        return Err(ConfigError::Validation(
            "checkpoint-interval-units must be >= 1".to_string(),
        ));
    }

    if !(1.0..=MAX_NIGHT_MULTIPLIER).contains(&config.night_mode_multiplier) {
        return Err(ConfigError::Validation(format!(
            "night-mode-multiplier must be between 1.0 and {}, got {}",
            MAX_NIGHT_MULTIPLIER, config.night_mode_multiplier
        )));
    }

    for (name, hour) in [
        ("night-hours-start", config.night_hours_start),
        ("night-hours-end", config.night_hours_end),
    ] {
        if hour > 23 {
            return Err(ConfigError::Validation(format!(
                "{} must be an hour between 0 and 23, got {}",
                name, hour
            )));
        }
    }

    if config.max_pages_per_unit < 1 {
        return Err(ConfigError::Validation(
            "max-pages-per-unit must be >= 1".to_string(),
        ));
    }

    if config.flush_retry_attempts < 1 {
        return Err(ConfigError::Validation(
            "flush-retry-attempts must be >= 1".to_string(),
        ));
    }

    for (name, seconds) in [
        ("claim-backoff-seconds", config.claim_backoff_seconds),
        ("flush-backoff-seconds", config.flush_backoff_seconds),
    ] {
        if !(0.0..=MAX_PAUSE_SECONDS).contains(&seconds) {
            return Err(ConfigError::Validation(format!(
                "{} must be between 0 and {}, got {}",
                name, MAX_PAUSE_SECONDS, seconds
            )));
        }
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain empty entries".to_string(),
        ));
    }

    if config.timeout_seconds < 1 {
        return Err(ConfigError::Validation(
            "timeout-seconds must be >= 1".to_string(),
        ));
    }

    if config.retry_attempts < 1 {
        return Err(ConfigError::Validation(
            "retry-attempts must be >= 1".to_string(),
        ));
    }

    if !(0.0..=MAX_PAUSE_SECONDS).contains(&config.retry_delay_seconds) {
        return Err(ConfigError::Validation(format!(
            "retry-delay-seconds must be between 0 and {}, got {}",
            MAX_PAUSE_SECONDS, config.retry_delay_seconds
        )));
    }

    Ok(())
}

/// Validates blocking-indicator rules
fn validate_ban_config(config: &BanConfig) -> Result<(), ConfigError> {
    for status in &config.blocked_statuses {
        if !(100..=599).contains(status) {
            return Err(ConfigError::Validation(format!(
                "blocked-statuses contains invalid HTTP status {}",
                status
            )));
        }
    }

    if config.blocked_phrases.iter().any(|p| p.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "blocked-phrases cannot contain empty phrases".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates origin entries: unique names, usable templates and selectors
fn validate_origins(origins: &[OriginConfig]) -> Result<(), ConfigError> {
    if origins.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[origin]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for origin in origins {
        if origin.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "origin name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(origin.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "origin '{}' is configured more than once",
                origin.name
            )));
        }

        validate_template(&origin.url_template).map_err(|e| {
            ConfigError::InvalidTemplate(format!("origin '{}': {}", origin.name, e))
        })?;

        for (key, selector) in origin.selectors() {
            Selector::parse(selector).map_err(|e| {
                ConfigError::InvalidSelector(format!(
                    "origin '{}' {} '{}': {:?}",
                    origin.name, key, selector, e
                ))
            })?;
        }
    }

    Ok(())
}

/// Validates catalog entries
fn validate_catalog(catalog: &[CatalogEntry]) -> Result<(), ConfigError> {
    if catalog.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[catalog]] entry must be configured".to_string(),
        ));
    }

    for entry in catalog {
        if entry.group.trim().is_empty() {
            return Err(ConfigError::Validation(
                "catalog group cannot be empty".to_string(),
            ));
        }

        if entry.subjects.is_empty() {
            return Err(ConfigError::Validation(format!(
                "catalog group '{}' must list at least one subject",
                entry.group
            )));
        }

        if entry.subjects.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "catalog group '{}' contains an empty subject",
                entry.group
            )));
        }
    }

    Ok(())
}
