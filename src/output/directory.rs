//! One JSON file per stored result
//!
//! Each result is written as `{ "key": ..., "content": ... }` to
//! `result_<n>.json` inside the output directory, where `n` increases
//! monotonically. The file name is the result reference.

use crate::output::traits::{ResultSink, SinkResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Serialize)]
struct StoredResult<'a, C> {
    key: &'a str,
    content: &'a C,
}

/// Writes results into a directory
pub struct DirectorySink {
    dir: PathBuf,
    next: AtomicU64,
}

impl DirectorySink {
    /// Opens (creating if needed) the output directory
    ///
    /// Numbering continues after the highest existing `result_<n>.json`.
    pub fn new(dir: &Path) -> SinkResult<Self> {
        std::fs::create_dir_all(dir)?;

        let mut highest = 0;
        for entry in std::fs::read_dir(dir)? {
            let name = entry?.file_name();
            if let Some(n) = name.to_str().and_then(parse_result_number) {
                highest = highest.max(n);
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            next: AtomicU64::new(highest + 1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn parse_result_number(name: &str) -> Option<u64> {
    name.strip_prefix("result_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

impl<C: Serialize> ResultSink<C> for DirectorySink {
    fn save(&self, key: &str, content: &C) -> SinkResult<String> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let name = format!("result_{}.json", n);
        let body = serde_json::to_vec_pretty(&StoredResult { key, content })?;
        std::fs::write(self.dir.join(&name), body)?;
        tracing::debug!("Stored result for {} as {}", key, name);
        Ok(name)
    }
}
