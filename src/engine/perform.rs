//! The boundary into domain-specific fetching
//!
//! The engine never knows what an item is. It hands the key to a `Performer`
//! once per attempt and only looks at whether the attempt succeeded and, if it
//! failed, whether the failure is worth retrying.

use std::future::Future;
use thiserror::Error;

/// Failure of one attempt, as classified by the performer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PerformError {
    /// The attempt failed; the item may be retried
    #[error("{0}")]
    Recoverable(String),

    /// The underlying resource is unusable; the whole run should stop
    #[error("fatal: {0}")]
    Fatal(String),
}

impl PerformError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Recoverable(m) | Self::Fatal(m) => m,
        }
    }
}

/// Executes one attempt for one item
pub trait Performer: Send + Sync + 'static {
    type Content: Send + 'static;

    fn perform(&self, key: &str)
        -> impl Future<Output = Result<Self::Content, PerformError>> + Send;
}

/// Adapts an async closure into a `Performer`
///
/// ```
/// use sumi_sweep::engine::{FnPerformer, PerformError};
///
/// let performer = FnPerformer::new(|key: String| async move {
///     Ok::<_, PerformError>(key.len())
/// });
/// # let _ = performer;
/// ```
pub struct FnPerformer<F>(F);

impl<F> FnPerformer<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F, Fut, C> Performer for FnPerformer<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, PerformError>> + Send + 'static,
    C: Send + 'static,
{
    type Content = C;

    fn perform(&self, key: &str) -> impl Future<Output = Result<C, PerformError>> + Send {
        (self.0)(key.to_string())
    }
}
