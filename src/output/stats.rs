//! Statistics over the persisted item state
//!
//! This module summarizes a state snapshot and prints it for `--stats`.

use crate::state::{ItemState, ItemStatus};
use crate::storage::{JsonStateStore, SnapshotMeta, SnapshotStats, StateMap, StateStore, StorageResult};

/// A failed item and why it failed last
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub key: String,
    pub status: ItemStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl FailedItem {
    fn from_state(state: &ItemState) -> Self {
        Self {
            key: state.key.clone(),
            status: state.status,
            attempts: state.attempt_count(),
            last_error: state.last_error.clone(),
        }
    }
}

/// State statistics summary
#[derive(Debug, Clone)]
pub struct StateStatistics {
    /// Count of items by status
    pub counts: SnapshotStats,

    /// Attempts recorded across every item
    pub total_attempts: u64,

    /// Failed items, permanent ones first, then by key
    pub failed_items: Vec<FailedItem>,

    pub meta: SnapshotMeta,
}

impl StateStatistics {
    pub fn from_items(items: &StateMap, meta: SnapshotMeta) -> Self {
        let mut failed_items: Vec<FailedItem> = items
            .values()
            .filter(|state| state.status.is_failure())
            .map(FailedItem::from_state)
            .collect();
        failed_items.sort_by(|a, b| {
            let rank = |s: ItemStatus| u8::from(s != ItemStatus::FailedPermanent);
            rank(a.status)
                .cmp(&rank(b.status))
                .then_with(|| a.key.cmp(&b.key))
        });

        Self {
            counts: SnapshotStats::from_items(items.values()),
            total_attempts: items.values().map(|s| u64::from(s.attempt_count())).sum(),
            failed_items,
            meta,
        }
    }

    /// Percentage of items completed
    pub fn completion_rate(&self) -> f64 {
        if self.counts.total == 0 {
            0.0
        } else {
            (self.counts.completed as f64 / self.counts.total as f64) * 100.0
        }
    }

    /// Items a later run would still pick up
    pub fn unfinished(&self) -> u64 {
        self.counts.pending + self.counts.in_progress + self.counts.failed_retryable
    }
}

/// Loads statistics from a snapshot store
///
/// # Returns
///
/// * `Ok(StateStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - The snapshot could not be read or parsed
pub fn load_statistics(store: &JsonStateStore) -> StorageResult<StateStatistics> {
    let items = store.load()?;
    Ok(StateStatistics::from_items(&items, store.meta()))
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StateStatistics) {
    println!("=== State Statistics ===\n");

    println!("Overview:");
    println!("  Total items: {}", stats.counts.total);
    println!("  Attempts recorded: {}", stats.total_attempts);
    if let Some(updated) = stats.meta.updated_at {
        println!("  Last saved: {}", updated.to_rfc3339());
    }
    println!();

    println!("Items by Status:");
    for status in ItemStatus::all() {
        let count = stats.counts.count(status);
        let percentage = if stats.counts.total > 0 {
            (count as f64 / stats.counts.total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.failed_items.is_empty() {
        println!("Failed Items ({}):", stats.failed_items.len());
        for item in &stats.failed_items {
            println!(
                "  - [{}] {} after {} attempts: {}",
                item.status,
                item.key,
                item.attempts,
                item.last_error.as_deref().unwrap_or("unknown error")
            );
        }
        println!();
    }

    println!(
        "Completion Rate: {:.1}% ({} / {} items completed, {} still unfinished)",
        stats.completion_rate(),
        stats.counts.completed,
        stats.counts.total,
        stats.unfinished()
    );
}
