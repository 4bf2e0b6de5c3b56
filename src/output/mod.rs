//! Output module for storing results and reporting on state
//!
//! This module handles:
//! - Storing fetched content through a `ResultSink`
//! - Computing statistics over the persisted state
//! - Generating markdown summaries

mod directory;
mod markdown;
mod sqlite_sink;
pub mod stats;
mod traits;

pub use directory::DirectorySink;
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use sqlite_sink::SqliteSink;
pub use stats::{load_statistics, print_statistics, FailedItem, StateStatistics};
pub use traits::{ResultSink, SinkError, SinkResult};

use crate::config::{OutputConfig, ResultsKind};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Opens the result sink selected by the output configuration
///
/// # Returns
///
/// * `Ok(Arc<dyn ResultSink<C>>)` - Sink ready for concurrent use
/// * `Err(SinkError)` - The directory or database could not be created
pub fn open_sink<C: Serialize + 'static>(
    config: &OutputConfig,
) -> SinkResult<Arc<dyn ResultSink<C>>> {
    let path = Path::new(&config.results_path);
    let sink: Arc<dyn ResultSink<C>> = match config.results {
        ResultsKind::Directory => Arc::new(DirectorySink::new(path)?),
        ResultsKind::Sqlite => Arc::new(SqliteSink::new(path)?),
    };
    tracing::debug!(
        "Opened {:?} result sink at {}",
        config.results,
        config.results_path
    );
    Ok(sink)
}
