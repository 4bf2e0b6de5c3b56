//! Decides whether an exhausted item may be tried again by a later run

use crate::state::{ItemState, ItemStatus};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    Retryable,
    Permanent,
}

impl FailureDisposition {
    pub fn status(self) -> ItemStatus {
        match self {
            Self::Retryable => ItemStatus::FailedRetryable,
            Self::Permanent => ItemStatus::FailedPermanent,
        }
    }
}

/// Classifies an item whose attempts for this run are exhausted
///
/// The state passed in already contains every attempt made so far, including
/// the ones from this run.
pub trait FailurePolicy: Send + Sync {
    fn classify(&self, state: &ItemState) -> FailureDisposition;
}

impl<F> FailurePolicy for F
where
    F: Fn(&ItemState) -> FailureDisposition + Send + Sync,
{
    fn classify(&self, state: &ItemState) -> FailureDisposition {
        self(state)
    }
}

/// Never gives up on an item
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetryable;

impl FailurePolicy for AlwaysRetryable {
    fn classify(&self, _state: &ItemState) -> FailureDisposition {
        FailureDisposition::Retryable
    }
}

/// Permanent once the item has used `limit` attempts over its lifetime
#[derive(Debug, Clone, Copy)]
pub struct LifetimeAttemptLimit {
    pub limit: u32,
}

impl LifetimeAttemptLimit {
    pub fn new(limit: u32) -> Self {
        Self { limit }
    }
}

impl FailurePolicy for LifetimeAttemptLimit {
    fn classify(&self, state: &ItemState) -> FailureDisposition {
        if state.attempt_count() >= self.limit {
            FailureDisposition::Permanent
        } else {
            FailureDisposition::Retryable
        }
    }
}

/// Builds the policy described by `runner.permanent-after`
pub fn policy_from_threshold(threshold: Option<u32>) -> Arc<dyn FailurePolicy> {
    match threshold {
        Some(limit) => Arc::new(LifetimeAttemptLimit::new(limit)),
        None => Arc::new(AlwaysRetryable),
    }
}
