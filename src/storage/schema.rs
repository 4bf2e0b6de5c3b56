//! Snapshot schema and its encode/decode pair
//!
//! The persisted document is a single JSON object:
//!
//! ```json
//! {
//!   "version": 1,
//!   "meta": { "created_at": "...", "updated_at": "...", "config_hash": "..." },
//!   "stats": { "total": 2, "pending": 0, "completed": 1, ... },
//!   "items": [ { "key": "https://...", "status": "completed", ... } ]
//! }
//! ```
//!
//! `stats` is informational and recomputed on every write. Older shapes are
//! not sniffed here; see `storage::legacy` for the one-time importer.

use crate::state::{ItemState, ItemStatus};
use crate::storage::traits::{StateMap, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Bookkeeping stored alongside the records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// Hash of the configuration that last wrote this snapshot
    #[serde(default)]
    pub config_hash: Option<String>,
}

/// Per-status counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub total: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed_retryable: u64,
    pub failed_permanent: u64,
}

impl SnapshotStats {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a ItemState>) -> Self {
        let mut stats = Self::default();
        for item in items {
            stats.total += 1;
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::InProgress => stats.in_progress += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::FailedRetryable => stats.failed_retryable += 1,
                ItemStatus::FailedPermanent => stats.failed_permanent += 1,
            }
        }
        stats
    }

    pub fn count(&self, status: ItemStatus) -> u64 {
        match status {
            ItemStatus::Pending => self.pending,
            ItemStatus::InProgress => self.in_progress,
            ItemStatus::Completed => self.completed,
            ItemStatus::FailedRetryable => self.failed_retryable,
            ItemStatus::FailedPermanent => self.failed_permanent,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    meta: SnapshotMeta,
    #[serde(default)]
    stats: SnapshotStats,
    #[serde(default)]
    items: Vec<ItemState>,
}

/// Encodes the mapping as a versioned snapshot document
///
/// Records are written in key order.
pub fn encode(items: &StateMap, meta: &SnapshotMeta) -> StorageResult<Vec<u8>> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        meta: meta.clone(),
        stats: SnapshotStats::from_items(items.values()),
        items: items.values().cloned().collect(),
    };

    Ok(serde_json::to_vec_pretty(&snapshot)?)
}

/// Decodes a snapshot document
///
/// Duplicate keys keep the last record. Anything that is not a versioned
/// snapshot object is `Corrupt`.
pub fn decode(bytes: &[u8]) -> StorageResult<(SnapshotMeta, StateMap)> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| StorageError::Corrupt(format!("not valid JSON: {}", e)))?;

    let version = value
        .get("version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| {
            StorageError::Corrupt(
                "missing snapshot version (older state files must be imported first)".to_string(),
            )
        })?;

    if version != u64::from(SNAPSHOT_VERSION) {
        return Err(StorageError::UnsupportedVersion(
            u32::try_from(version).unwrap_or(u32::MAX),
        ));
    }

    let snapshot: Snapshot = serde_json::from_value(value)
        .map_err(|e| StorageError::Corrupt(format!("malformed snapshot: {}", e)))?;

    let mut items = StateMap::new();
    for record in snapshot.items {
        if let Err(violation) = record.check_invariants() {
            tracing::warn!("Loaded record breaks an invariant: {}", violation);
        }
        if let Some(previous) = items.insert(record.key.clone(), record) {
            tracing::warn!("Duplicate record for {} in snapshot, keeping the last", previous.key);
        }
    }

    Ok((snapshot.meta, items))
}
