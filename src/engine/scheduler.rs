//! Bounded worker pool driving items through their lifecycle
//!
//! This module handles:
//! - FIFO admission of item keys
//! - Capping the number of in-flight items at the configured concurrency
//! - Running each item through `RetryingOperation`
//! - Writing item state through the ledger after every attempt and outcome
//! - Cooperative shutdown and draining

use crate::engine::perform::{PerformError, Performer};
use crate::engine::policy::FailurePolicy;
use crate::engine::retry::{RetryError, RetryingOperation};
use crate::engine::Summary;
use crate::output::ResultSink;
use crate::state::{ItemStatus, StateLedger};
use crate::SweepError;
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Collaborators shared by every worker
pub struct WorkerContext<P: Performer> {
    pub performer: Arc<P>,
    pub sink: Arc<dyn ResultSink<P::Content>>,
    pub ledger: Arc<StateLedger>,
    pub retry: RetryingOperation,
    pub policy: Arc<dyn FailurePolicy>,
}

/// How one admitted item ended this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed,
    FailedRetryable,
    FailedPermanent,

    /// Shutdown arrived before the item reached a result
    Interrupted,
}

struct Finished {
    key: String,
    result: Result<ItemOutcome, SweepError>,
}

/// Scheduler owns the admission queue and the set of running workers
///
/// At most `concurrency` items are in flight at once. Keys are admitted in the
/// order they were handed to `admit`; completions may arrive in any order.
pub struct Scheduler<P: Performer> {
    concurrency: usize,
    context: Arc<WorkerContext<P>>,

    /// Keys waiting for a free worker
    queue: VecDeque<String>,

    /// Keys currently owned by a worker
    in_flight: HashSet<String>,

    /// Every key ever admitted, so a key is never owned by two workers
    admitted: HashSet<String>,

    workers: JoinSet<Finished>,

    /// Child of the caller's token; also cancelled on a fatal error
    cancel: CancellationToken,

    summary: Summary,
    fatal: Option<SweepError>,
}

impl<P: Performer> Scheduler<P> {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `concurrency` - Maximum in-flight items (values below 1 are raised to 1)
    /// * `context` - Performer, sink, ledger and policies used by workers
    /// * `cancel` - Shutdown signal from the caller
    pub fn new(concurrency: usize, context: WorkerContext<P>, cancel: &CancellationToken) -> Self {
        Self {
            concurrency: concurrency.max(1),
            context: Arc::new(context),
            queue: VecDeque::new(),
            in_flight: HashSet::new(),
            admitted: HashSet::new(),
            workers: JoinSet::new(),
            cancel: cancel.child_token(),
            summary: Summary::default(),
            fatal: None,
        }
    }

    /// Queues keys for processing, preserving their order
    ///
    /// Keys already admitted to this scheduler are ignored.
    pub fn admit(&mut self, keys: impl IntoIterator<Item = String>) {
        for key in keys {
            if self.admitted.insert(key.clone()) {
                self.queue.push_back(key);
            }
        }
    }

    /// Number of keys currently owned by a worker
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of keys waiting for a free worker
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Counts recorded so far
    ///
    /// After `drain` fails this holds the outcomes reached before the error.
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Starts workers until the pool is full or the queue is empty
    fn fill(&mut self) {
        while !self.cancel.is_cancelled() && self.in_flight.len() < self.concurrency {
            let Some(key) = self.queue.pop_front() else {
                break;
            };

            tracing::debug!("Admitting {} ({} in flight)", key, self.in_flight.len() + 1);
            self.in_flight.insert(key.clone());

            let context = Arc::clone(&self.context);
            let cancel = self.cancel.clone();
            self.workers.spawn(async move {
                let result = process_item(&context, &key, &cancel).await;
                Finished { key, result }
            });
        }
    }

    fn record(&mut self, finished: Finished) {
        self.in_flight.remove(&finished.key);

        match finished.result {
            Ok(outcome) => self.summary.tally(outcome),
            Err(err) => {
                tracing::error!("Stopping run after {}: {}", finished.key, err);
                // A write can fail after the record already reached its outcome
                let outcome = match self.context.ledger.get(&finished.key).map(|s| s.status) {
                    Some(ItemStatus::Completed) => ItemOutcome::Completed,
                    Some(ItemStatus::FailedPermanent) => ItemOutcome::FailedPermanent,
                    _ => ItemOutcome::FailedRetryable,
                };
                self.summary.tally(outcome);
                self.cancel.cancel();
                if self.fatal.is_none() {
                    self.fatal = Some(err);
                }
            }
        }
    }

    /// Runs until every admitted key has finished or shutdown leaves nothing
    /// running
    ///
    /// After this returns no key admitted by this scheduler is left
    /// `InProgress`. Keys still queued when shutdown arrived are left untouched
    /// and counted as interrupted.
    ///
    /// # Returns
    ///
    /// * `Ok(Summary)` - Outcome counts for this drain
    /// * `Err(SweepError)` - The first fatal condition (persistence failure or
    ///   fatal operation error) seen by any worker
    pub async fn drain(&mut self) -> Result<Summary, SweepError> {
        loop {
            self.fill();

            match self.workers.join_next().await {
                Some(Ok(finished)) => self.record(finished),
                Some(Err(join_error)) => {
                    tracing::error!("Worker task ended abnormally: {}", join_error);
                }
                None => break,
            }
        }

        // Only an abnormally ended worker can leave a key behind
        let orphaned: Vec<String> = self.in_flight.drain().collect();
        for key in orphaned {
            let result = self.context.ledger.update(&key, |state| {
                state.fail(
                    ItemStatus::FailedRetryable,
                    "worker ended abnormally".to_string(),
                    Utc::now(),
                )
            });
            if let Err(e) = result {
                tracing::error!("Failed to persist state for {}: {}", key, e);
            }
            self.summary.tally(ItemOutcome::FailedRetryable);
        }

        if !self.queue.is_empty() {
            tracing::info!(
                "Shutdown left {} queued items unstarted",
                self.queue.len()
            );
            self.summary.interrupted += self.queue.len() as u64;
            self.queue.clear();
        }

        match self.fatal.take() {
            Some(err) => Err(err),
            None => Ok(std::mem::take(&mut self.summary)),
        }
    }
}

/// Processes one item from admission to its outcome for this run
async fn process_item<P: Performer>(
    context: &WorkerContext<P>,
    key: &str,
    cancel: &CancellationToken,
) -> Result<ItemOutcome, SweepError> {
    if cancel.is_cancelled() {
        return Ok(ItemOutcome::Interrupted);
    }

    let ledger = &context.ledger;
    let (previous, first_attempt) = ledger.update(key, |state| {
        let previous = state.clone();
        state.begin(Utc::now());
        (previous, state.next_attempt_number())
    })?;

    let result = context
        .retry
        .execute(
            key,
            first_attempt,
            cancel,
            |_| {
                let performer = Arc::clone(&context.performer);
                let sink = Arc::clone(&context.sink);
                let key = key.to_string();
                async move {
                    let content = performer.perform(&key).await?;
                    sink.save(&key, &content)
                        .map_err(|e| PerformError::fatal(format!("failed to store result: {}", e)))
                }
            },
            |attempt| {
                // The successful attempt is written together with the completion
                if attempt.is_success() {
                    return Ok(());
                }
                ledger.update(key, |state| state.record_attempt(attempt.clone()))
            },
        )
        .await;

    match result {
        Ok(success) => {
            ledger.update(key, |state| {
                if let Some(attempt) = success.attempts.last() {
                    state.record_attempt(attempt.clone());
                }
                state.complete(success.content, Utc::now())
            })?;
            tracing::info!("Completed {}", key);
            Ok(ItemOutcome::Completed)
        }
        Err(RetryError::RetriesExhausted { last_error, .. }) => {
            let status = ledger.update(key, |state| {
                let status = context.policy.classify(state).status();
                state.fail(status, last_error.clone(), Utc::now());
                status
            })?;
            tracing::warn!("Giving up on {} for this run ({}): {}", key, status, last_error);
            Ok(match status {
                ItemStatus::FailedPermanent => ItemOutcome::FailedPermanent,
                _ => ItemOutcome::FailedRetryable,
            })
        }
        Err(RetryError::Fatal { error, .. }) => {
            ledger.update(key, |state| {
                state.fail(ItemStatus::FailedRetryable, error.clone(), Utc::now())
            })?;
            Err(SweepError::FatalOperation {
                key: key.to_string(),
                message: error,
            })
        }
        Err(RetryError::Cancelled {
            attempts,
            last_error,
        }) => {
            ledger.update(key, |state| {
                if attempts.is_empty() {
                    // Never attempted this run; put back the pre-admission record
                    *state = previous;
                } else {
                    let error = last_error.unwrap_or_else(|| "interrupted".to_string());
                    state.fail(ItemStatus::FailedRetryable, error, Utc::now());
                }
            })?;
            tracing::info!("Interrupted {}", key);
            Ok(ItemOutcome::Interrupted)
        }
        Err(RetryError::Persistence { source, .. }) => {
            // Only failed attempts go through the observer, so memory already
            // holds that failure for the final flush
            let result = ledger.update(key, |state| {
                state.fail(
                    ItemStatus::FailedRetryable,
                    format!("state could not be persisted: {}", source),
                    Utc::now(),
                )
            });
            if let Err(e) = result {
                tracing::error!("Failed to persist state for {}: {}", key, e);
            }
            Err(SweepError::Storage(source))
        }
    }
}
