//! Task scheduling and resumable-state engine
//!
//! This module contains the core batch logic, including:
//! - Backoff curves between attempts
//! - Bounded retry around the injected operation
//! - The bounded worker pool and per-item state transitions
//! - Run orchestration with resume and final flush
//!
//! The engine knows nothing about what an item is. Fetching is supplied
//! through the `Performer` trait and result storage through `ResultSink`.

mod backoff;
mod orchestrator;
mod perform;
mod policy;
mod retry;
mod scheduler;

pub use backoff::BackoffPolicy;
pub use orchestrator::{is_eligible, next_eligible_at, pending_keys, Orchestrator, RunOptions};
pub use perform::{FnPerformer, PerformError, Performer};
pub use policy::{
    policy_from_threshold, AlwaysRetryable, FailureDisposition, FailurePolicy,
    LifetimeAttemptLimit,
};
pub use retry::{RetryError, RetrySuccess, RetryingOperation};
pub use scheduler::{ItemOutcome, Scheduler, WorkerContext};

/// Outcome counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub completed: u64,

    /// Items that ended this run as `FailedRetryable`
    pub failed: u64,

    pub permanently_failed: u64,

    /// Items left unfinished by a shutdown request
    pub interrupted: u64,
}

impl Summary {
    pub fn tally(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Completed => self.completed += 1,
            ItemOutcome::FailedRetryable => self.failed += 1,
            ItemOutcome::FailedPermanent => self.permanently_failed += 1,
            ItemOutcome::Interrupted => self.interrupted += 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
