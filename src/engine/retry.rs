//! Bounded retry with backoff around a single operation
//!
//! Attempts are numbered from wherever the item's history left off, so an item
//! resumed in a later run keeps counting instead of restarting at 1. Every
//! finished attempt is handed to an observer before the next decision is made,
//! which is where the scheduler writes progress through to the store.

use crate::engine::backoff::BackoffPolicy;
use crate::engine::perform::PerformError;
use crate::state::AttemptRecord;
use crate::storage::StorageError;
use chrono::Utc;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The first successful attempt and everything recorded on the way
#[derive(Debug)]
pub struct RetrySuccess<T> {
    pub content: T,
    pub attempts: Vec<AttemptRecord>,
}

/// Why an item stopped without succeeding
#[derive(Debug, Error)]
pub enum RetryError {
    /// Every allowed attempt failed
    #[error("retries exhausted after {} attempts: {last_error}", attempts.len())]
    RetriesExhausted {
        attempts: Vec<AttemptRecord>,
        last_error: String,
    },

    /// The operation reported a condition that should stop the whole run
    #[error("fatal operation failure: {error}")]
    Fatal {
        attempts: Vec<AttemptRecord>,
        error: String,
    },

    /// Shutdown was requested before the next attempt could start
    #[error("cancelled after {} attempts", attempts.len())]
    Cancelled {
        attempts: Vec<AttemptRecord>,
        last_error: Option<String>,
    },

    /// The attempt observer could not persist progress
    #[error("failed to persist attempt: {source}")]
    Persistence {
        attempts: Vec<AttemptRecord>,
        #[source]
        source: StorageError,
    },
}

impl RetryError {
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::RetriesExhausted { attempts, .. }
            | Self::Fatal { attempts, .. }
            | Self::Cancelled { attempts, .. }
            | Self::Persistence { attempts, .. } => attempts,
        }
    }
}

/// Runs an operation up to `max_attempts` times per call
#[derive(Debug, Clone, Copy)]
pub struct RetryingOperation {
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl RetryingOperation {
    /// `max_attempts` below 1 is raised to 1
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Executes `op` until it succeeds, fails fatally, runs out of attempts,
    /// or `cancel` fires
    ///
    /// `op` receives the attempt number. No wait follows the final attempt,
    /// and a cancellation never interrupts an attempt already running; it only
    /// cuts short the backoff wait and prevents the next attempt.
    ///
    /// # Arguments
    ///
    /// * `key` - Item key, for logging
    /// * `first_attempt` - Number given to the first attempt of this call
    /// * `cancel` - Cooperative shutdown signal
    /// * `op` - The operation to run once per attempt
    /// * `observe` - Called with each finished attempt; an error stops the loop
    pub async fn execute<T, Op, Fut, Obs>(
        &self,
        key: &str,
        first_attempt: u32,
        cancel: &CancellationToken,
        mut op: Op,
        mut observe: Obs,
    ) -> Result<RetrySuccess<T>, RetryError>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PerformError>>,
        Obs: FnMut(&AttemptRecord) -> Result<(), StorageError>,
    {
        let first_attempt = first_attempt.max(1);
        let mut attempts = Vec::new();
        let mut last_error: Option<String> = None;

        for offset in 0..self.max_attempts {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts,
                    last_error,
                });
            }

            let number = first_attempt + offset;
            let started_at = Utc::now();
            tracing::debug!("Attempt {} for {}", number, key);
            let result = op(number).await;
            let ended_at = Utc::now();

            let record = match &result {
                Ok(_) => AttemptRecord::success(number, started_at, ended_at),
                Err(e) => AttemptRecord::failure(number, started_at, ended_at, e.message()),
            };
            let observed = observe(&record);
            attempts.push(record);
            if let Err(source) = observed {
                return Err(RetryError::Persistence { attempts, source });
            }

            let error = match result {
                Ok(content) => return Ok(RetrySuccess { content, attempts }),
                Err(PerformError::Fatal(error)) => {
                    tracing::error!("Attempt {} for {} failed fatally: {}", number, key, error);
                    return Err(RetryError::Fatal { attempts, error });
                }
                Err(PerformError::Recoverable(error)) => error,
            };

            tracing::debug!("Attempt {} for {} failed: {}", number, key, error);
            last_error = Some(error);

            if offset + 1 < self.max_attempts {
                let delay = self.backoff.delay(number);
                tracing::debug!("Waiting {:?} before retrying {}", delay, key);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(RetryError::Cancelled { attempts, last_error });
                    }
                }
            }
        }

        Err(RetryError::RetriesExhausted {
            attempts,
            last_error: last_error.unwrap_or_default(),
        })
    }
}
