//! Configuration module for Sumi-Sweep
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! with a small set of environment variable overrides applied on top.
//!
//! # Example
//!
//! ```no_run
//! use sumi_sweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sweep.toml")).unwrap();
//! println!("Running with concurrency {}", config.runner.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BackoffConfig, BackoffKind, Config, FetchConfig, FieldSelector, InputConfig, OutputConfig,
    ResultsKind, RetryGating, RunnerConfig,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash, ENV_CONCURRENCY,
    ENV_LEGACY_MAX_RETRIES, ENV_MAX_ATTEMPTS, ENV_STATE_PATH,
};
pub use validation::validate;
