//! State module for tracking item progress
//!
//! This module provides the per-item lifecycle record and the shared ledger
//! that applies and persists changes during a run.
//!
//! # Components
//!
//! - `ItemStatus`: Lifecycle status (pending, in progress, completed, failed)
//! - `ItemState`: The persisted record for one item, with its attempt history
//! - `StateLedger`: The live mapping for a run, written through on every change

mod item_state;
mod ledger;

// Re-export main types
pub use item_state::{AttemptOutcome, AttemptRecord, ItemState, ItemStatus};
pub use ledger::StateLedger;
