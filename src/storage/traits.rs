//! Storage traits and error types
//!
//! This module defines the trait interface for state store backends and
//! associated error types.

use crate::state::ItemState;
use std::collections::BTreeMap;
use thiserror::Error;

/// Full mapping from item key to its state
pub type StateMap = BTreeMap<String, ItemState>;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt state: {0}")]
    Corrupt(String),

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unrecognized legacy state: {0}")]
    Legacy(String),

    #[error("State lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable key → state mapping backed by a single snapshot
///
/// Implementations must serialize concurrent `save_all` calls so a reader
/// never observes a partial or interleaved snapshot.
pub trait StateStore: Send + Sync {
    /// Loads every persisted record
    ///
    /// A missing snapshot is an empty mapping. An unreadable one is
    /// `StorageError::Corrupt`.
    fn load(&self) -> StorageResult<StateMap>;

    /// Atomically replaces the persisted snapshot
    fn save_all(&self, items: &StateMap) -> StorageResult<()>;

    /// Loads state, treating a corrupt snapshot as empty
    ///
    /// Other failures (permission errors, a snapshot written by a newer
    /// version) are still returned.
    fn load_or_reset(&self) -> StorageResult<StateMap> {
        match self.load() {
            Ok(items) => Ok(items),
            Err(err @ StorageError::Corrupt(_)) => {
                tracing::warn!("Discarding unreadable state, starting fresh: {}", err);
                Ok(StateMap::new())
            }
            Err(e) => Err(e),
        }
    }
}
