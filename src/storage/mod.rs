//! Storage module for persisting item state
//!
//! This module handles durable state for the batch runner, including:
//! - The `StateStore` trait and its error type
//! - The versioned snapshot schema
//! - A single-file JSON store with atomic rewrites
//! - A one-time importer for older state files

mod json;
pub mod legacy;
pub mod schema;
mod traits;

pub use json::JsonStateStore;
pub use schema::{SnapshotMeta, SnapshotStats, SNAPSHOT_VERSION};
pub use traits::{StateMap, StateStore, StorageError, StorageResult};
