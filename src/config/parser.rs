use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Overrides `runner.concurrency`
pub const ENV_CONCURRENCY: &str = "SUMI_SWEEP_CONCURRENCY";

/// Overrides `runner.max-attempts`
pub const ENV_MAX_ATTEMPTS: &str = "SUMI_SWEEP_MAX_ATTEMPTS";

/// Older deployments set the attempt limit through this name
pub const ENV_LEGACY_MAX_RETRIES: &str = "MAX_RETRIES";

/// Overrides `output.state-path`
pub const ENV_STATE_PATH: &str = "SUMI_SWEEP_STATE_PATH";

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied after parsing and before validation, so
/// an override can never smuggle in an invalid value.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate(&config)?;

    Ok(config)
}

/// Applies environment overrides using the given variable lookup
///
/// `SUMI_SWEEP_MAX_ATTEMPTS` wins over the legacy `MAX_RETRIES` when both are set.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_CONCURRENCY) {
        config.runner.concurrency = parse_env_u32(ENV_CONCURRENCY, &value)?;
    }

    if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
        config.runner.max_attempts = parse_env_u32(ENV_MAX_ATTEMPTS, &value)?;
    } else if let Some(value) = lookup(ENV_LEGACY_MAX_RETRIES) {
        config.runner.max_attempts = parse_env_u32(ENV_LEGACY_MAX_RETRIES, &value)?;
    }

    if let Some(value) = lookup(ENV_STATE_PATH) {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidEnv {
                name: ENV_STATE_PATH.to_string(),
                value,
            });
        }
        config.output.state_path = value;
    }

    Ok(())
}

fn parse_env_u32(name: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: value.to_string(),
        })
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is stored in the state snapshot so a resumed run can tell whether
/// the configuration changed since the state was written.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
