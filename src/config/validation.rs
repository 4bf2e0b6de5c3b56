use crate::config::types::{BackoffConfig, BackoffKind, Config, FetchConfig, OutputConfig, RunnerConfig};
use crate::ConfigError;
use std::collections::HashSet;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_runner_config(&config.runner)?;
    validate_backoff_config(&config.backoff)?;
    validate_paths(config)?;
    validate_output_config(&config.output)?;
    validate_fetch_config(&config.fetch)?;
    Ok(())
}

/// Validates worker pool and retry settings
fn validate_runner_config(config: &RunnerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if let Some(threshold) = config.permanent_after {
        if threshold < 1 {
            return Err(ConfigError::Validation(format!(
                "permanent_after must be >= 1, got {}",
                threshold
            )));
        }
    }

    Ok(())
}

/// Validates the backoff curve
fn validate_backoff_config(config: &BackoffConfig) -> Result<(), ConfigError> {
    if config.cap_ms < config.base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff cap_ms ({}) must be >= base_ms ({})",
            config.cap_ms, config.base_ms
        )));
    }

    if config.kind == BackoffKind::Exponential
        && (!config.multiplier.is_finite() || config.multiplier < 1.0)
    {
        return Err(ConfigError::Validation(format!(
            "backoff multiplier must be a finite number >= 1.0, got {}",
            config.multiplier
        )));
    }

    Ok(())
}

fn validate_paths(config: &Config) -> Result<(), ConfigError> {
    if config.input.items_path.is_empty() {
        return Err(ConfigError::Validation(
            "items_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.state_path.is_empty() {
        return Err(ConfigError::Validation(
            "state_path cannot be empty".to_string(),
        ));
    }

    if config.results_path.is_empty() {
        return Err(ConfigError::Validation(
            "results_path cannot be empty".to_string(),
        ));
    }

    if config.results_path == config.state_path {
        return Err(ConfigError::Validation(format!(
            "results_path and state_path must differ, both are '{}'",
            config.state_path
        )));
    }

    Ok(())
}

/// Validates fetch and extraction settings
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for field in &config.fields {
        if field.name.is_empty() {
            return Err(ConfigError::Validation(
                "field name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate field name '{}'",
                field.name
            )));
        }

        validate_selector(&field.selector)?;
    }

    Ok(())
}

/// Checks that a CSS selector parses
fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    scraper::Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::Validation(format!("Invalid selector '{}': {}", selector, e)))
}
