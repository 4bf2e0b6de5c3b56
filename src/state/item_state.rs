/// Item lifecycle definitions for tracking per-item progress
///
/// Every work item has exactly one `ItemState`, keyed by the item's identifier.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current lifecycle status of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Item is known but no attempt has been made yet
    #[default]
    Pending,

    /// Item is owned by a worker and being attempted
    InProgress,

    /// Item was fetched and its result stored
    Completed,

    /// Item failed but may be picked up again by a later run
    FailedRetryable,

    /// Item failed and will never be re-enqueued
    FailedPermanent,
}

impl ItemStatus {
    /// Returns true if this is a terminal status (excluded from future runs)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::FailedPermanent)
    }

    /// Returns true if this status represents a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailedRetryable | Self::FailedPermanent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::FailedRetryable => "failed_retryable",
            Self::FailedPermanent => "failed_permanent",
        }
    }

    /// Returns all possible statuses
    pub fn all() -> [Self; 5] {
        [
            Self::Pending,
            Self::InProgress,
            Self::Completed,
            Self::FailedRetryable,
            Self::FailedPermanent,
        ]
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// One execution of the fetch operation for an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based, continues across runs
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,

    /// Present iff `outcome` is `Failure`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptRecord {
    pub fn success(attempt_number: u32, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        Self {
            attempt_number,
            started_at,
            ended_at,
            outcome: AttemptOutcome::Success,
            error: None,
        }
    }

    pub fn failure(
        attempt_number: u32,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            attempt_number,
            started_at,
            ended_at,
            outcome: AttemptOutcome::Failure,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

/// Persisted record for one item
///
/// Optional fields default to empty when missing from an older snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    pub key: String,

    #[serde(default)]
    pub status: ItemStatus,

    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
}

impl ItemState {
    /// Creates a fresh `Pending` record with no attempts
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: ItemStatus::Pending,
            attempts: Vec::new(),
            started_at: None,
            ended_at: None,
            last_error: None,
            result_ref: None,
        }
    }

    /// Number of attempts made over the item's whole lifetime
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// The number the next attempt will carry
    pub fn next_attempt_number(&self) -> u32 {
        self.attempts
            .last()
            .map(|a| a.attempt_number + 1)
            .unwrap_or(1)
    }

    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }

    /// Hands the item to a worker
    ///
    /// `started_at` is kept from the first time the item left `Pending`.
    pub fn begin(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::InProgress;
        self.last_error = None;
        self.result_ref = None;
        self.ended_at = None;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// Appends a finished attempt
    pub fn record_attempt(&mut self, attempt: AttemptRecord) {
        debug_assert_eq!(attempt.attempt_number, self.next_attempt_number());
        self.attempts.push(attempt);
    }

    /// Marks the item completed with the stored result reference
    pub fn complete(&mut self, result_ref: String, now: DateTime<Utc>) {
        self.status = ItemStatus::Completed;
        self.result_ref = Some(result_ref);
        self.last_error = None;
        self.ended_at = Some(now);
    }

    /// Marks the item failed, either retryable or permanent
    pub fn fail(&mut self, status: ItemStatus, error: String, now: DateTime<Utc>) {
        debug_assert!(status.is_failure());
        self.status = status;
        self.last_error = Some(error);
        self.result_ref = None;
        self.ended_at = Some(now);
    }

    /// Checks the record's structural invariants
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.status != ItemStatus::Pending && self.attempts.is_empty() {
            // An in-progress item may not have finished its first attempt yet
            if self.status != ItemStatus::InProgress {
                return Err(format!("{}: {} with no attempts", self.key, self.status));
            }
        }

        for (index, attempt) in self.attempts.iter().enumerate() {
            let expected = index as u32 + 1;
            if attempt.attempt_number != expected {
                return Err(format!(
                    "{}: attempt number {} where {} was expected",
                    self.key, attempt.attempt_number, expected
                ));
            }
            if attempt.is_success() == attempt.error.is_some() {
                return Err(format!(
                    "{}: attempt {} has mismatched outcome and error",
                    self.key, attempt.attempt_number
                ));
            }
        }

        let successes = self.attempts.iter().filter(|a| a.is_success()).count();
        let completed = self.status == ItemStatus::Completed;
        if completed != (successes == 1) || successes > 1 {
            return Err(format!(
                "{}: {} successful attempts with status {}",
                self.key, successes, self.status
            ));
        }

        if completed != self.result_ref.is_some() {
            return Err(format!(
                "{}: result reference does not match status {}",
                self.key, self.status
            ));
        }

        if self.last_error.is_some() && !self.status.is_failure() {
            return Err(format!(
                "{}: last error set with status {}",
                self.key, self.status
            ));
        }

        Ok(())
    }
}
