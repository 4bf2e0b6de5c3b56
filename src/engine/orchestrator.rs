//! Run orchestration: pending-set selection, one full pass, final flush
//!
//! A run:
//! 1. Loads state from the store (a corrupt snapshot is treated as empty)
//! 2. Picks the pending keys from the full item list
//! 3. Drives a scheduler over them until it drains
//! 4. Flushes the final state, on both the success and the error path

use crate::config::{Config, RetryGating};
use crate::engine::backoff::BackoffPolicy;
use crate::engine::perform::Performer;
use crate::engine::policy::{AlwaysRetryable, FailurePolicy};
use crate::engine::retry::RetryingOperation;
use crate::engine::scheduler::{Scheduler, WorkerContext};
use crate::engine::Summary;
use crate::output::ResultSink;
use crate::state::{ItemState, ItemStatus, StateLedger};
use crate::storage::{StateMap, StateStore};
use crate::SweepError;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Knobs fixed for the duration of one run
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub gating: RetryGating,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.runner.concurrency as usize,
            max_attempts: config.runner.max_attempts,
            backoff: BackoffPolicy::from_config(&config.backoff),
            gating: config.runner.retry_gating,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            gating: RetryGating::default(),
        }
    }
}

/// Whether an item should be processed by a run starting at `now`
///
/// Items with no record, `Pending` items and `InProgress` items left behind by
/// a crash are always eligible. `FailedRetryable` items are eligible
/// immediately under `RetryGating::Immediate`, or once
/// `last attempt end + backoff(attempt count)` has passed under
/// `RetryGating::Backoff`. Terminal items never are.
pub fn is_eligible(
    state: Option<&ItemState>,
    backoff: &BackoffPolicy,
    gating: RetryGating,
    now: DateTime<Utc>,
) -> bool {
    let Some(state) = state else {
        return true;
    };

    match state.status {
        ItemStatus::Completed | ItemStatus::FailedPermanent => false,
        ItemStatus::Pending | ItemStatus::InProgress => true,
        ItemStatus::FailedRetryable => match gating {
            RetryGating::Immediate => true,
            RetryGating::Backoff => next_eligible_at(state, backoff).map_or(true, |at| at <= now),
        },
    }
}

/// When a retryable failure may be picked up again under backoff gating
pub fn next_eligible_at(state: &ItemState, backoff: &BackoffPolicy) -> Option<DateTime<Utc>> {
    let last = state.last_attempt()?;
    let wait = chrono::Duration::from_std(backoff.delay(state.attempt_count())).ok()?;
    last.ended_at.checked_add_signed(wait)
}

/// Selects the keys to process, in input order, without duplicates
pub fn pending_keys(
    all_keys: &[String],
    items: &StateMap,
    options: &RunOptions,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    all_keys
        .iter()
        .filter(|key| seen.insert(key.as_str()))
        .filter(|key| is_eligible(items.get(key.as_str()), &options.backoff, options.gating, now))
        .cloned()
        .collect()
}

/// Drives one pass over an item list
pub struct Orchestrator<P: Performer> {
    store: Arc<dyn StateStore>,
    performer: Arc<P>,
    sink: Arc<dyn ResultSink<P::Content>>,
    policy: Arc<dyn FailurePolicy>,
    options: RunOptions,
}

impl<P: Performer> Orchestrator<P> {
    /// Creates an orchestrator that never marks items permanently failed
    pub fn new(
        store: Arc<dyn StateStore>,
        performer: Arc<P>,
        sink: Arc<dyn ResultSink<P::Content>>,
        options: RunOptions,
    ) -> Self {
        Self {
            store,
            performer,
            sink,
            policy: Arc::new(AlwaysRetryable),
            options,
        }
    }

    /// Replaces the policy deciding retryable versus permanent failure
    pub fn with_failure_policy(mut self, policy: Arc<dyn FailurePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Runs one full pass over `all_keys`
    ///
    /// Running again over the same store only picks up work that is still
    /// unfinished; a store where every item is terminal yields an empty
    /// summary without starting any worker.
    ///
    /// # Arguments
    ///
    /// * `all_keys` - The full item list, in admission order
    /// * `cancel` - Cooperative shutdown signal; cancelling twice is harmless
    ///
    /// # Returns
    ///
    /// * `Ok(Summary)` - Outcome counts for this run
    /// * `Err(SweepError)` - A persistence failure or fatal operation error;
    ///   state reached before the error has still been flushed when possible
    pub async fn run(
        &self,
        all_keys: &[String],
        cancel: &CancellationToken,
    ) -> Result<Summary, SweepError> {
        let mut items = self.store.load_or_reset()?;
        let pending = pending_keys(all_keys, &items, &self.options, Utc::now());

        if pending.is_empty() {
            tracing::info!("No unfinished items among {} keys", all_keys.len());
            return Ok(Summary::default());
        }

        tracing::info!(
            "Processing {} of {} items with concurrency {}",
            pending.len(),
            all_keys.len(),
            self.options.concurrency
        );

        for key in &pending {
            items
                .entry(key.clone())
                .or_insert_with(|| ItemState::new(key.clone()));
        }

        let ledger = Arc::new(StateLedger::new(items, Arc::clone(&self.store)));
        let context = WorkerContext {
            performer: Arc::clone(&self.performer),
            sink: Arc::clone(&self.sink),
            ledger: Arc::clone(&ledger),
            retry: RetryingOperation::new(self.options.max_attempts, self.options.backoff),
            policy: Arc::clone(&self.policy),
        };

        let mut scheduler = Scheduler::new(self.options.concurrency, context, cancel);
        scheduler.admit(pending);
        let drained = scheduler.drain().await;

        let flushed = ledger.flush();

        match (drained, flushed) {
            (Ok(summary), Ok(())) => {
                tracing::info!(
                    "Run finished: {} completed, {} failed, {} permanently failed, {} interrupted",
                    summary.completed,
                    summary.failed,
                    summary.permanently_failed,
                    summary.interrupted
                );
                Ok(summary)
            }
            (Ok(_), Err(flush_error)) => Err(flush_error.into()),
            (Err(run_error), flushed) => {
                let partial = scheduler.summary();
                tracing::warn!(
                    "Run stopped early: {} completed, {} failed, {} permanently failed",
                    partial.completed,
                    partial.failed,
                    partial.permanently_failed
                );
                if let Err(flush_error) = flushed {
                    tracing::error!("Final flush failed as well: {}", flush_error);
                }
                Err(run_error)
            }
        }
    }
}
