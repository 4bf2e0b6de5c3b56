//! Result sink trait and error types
//!
//! A sink stores the content produced by a successful attempt and returns an
//! opaque reference that the item's state keeps as `result_ref`.

use thiserror::Error;

/// Errors that can occur while storing a result
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Stores fetched content for an item
///
/// Called once per item, on its first successful attempt. Implementations
/// must be safe to call from several workers at once.
pub trait ResultSink<C>: Send + Sync {
    /// Persists `content` and returns a reference to it
    fn save(&self, key: &str, content: &C) -> SinkResult<String>;
}
