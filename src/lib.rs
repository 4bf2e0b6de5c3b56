//! Sumi-Sweep: a resumable batch content fetcher
//!
//! This crate drives a list of work items (usually URLs) through an injected
//! fetch operation with bounded concurrency, retrying transient failures with
//! backoff and persisting per-item progress so an interrupted run resumes only
//! the unfinished work.

pub mod config;
pub mod engine;
pub mod fetch;
pub mod input;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Sumi-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Persistence failure: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Result sink error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("Fatal error while processing {key}: {message}")]
    FatalOperation { key: String, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
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

    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnv { name: String, value: String },
}

/// Errors raised while loading the item list
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to read item list: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input format: {0}")]
    InvalidInputFormat(String),
}

/// Result type alias for Sumi-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use engine::{BackoffPolicy, Orchestrator, PerformError, Performer, Summary};
pub use state::{AttemptOutcome, AttemptRecord, ItemState, ItemStatus};
pub use storage::{JsonStateStore, StateStore};
