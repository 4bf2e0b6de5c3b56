//! SQLite result sink
//!
//! Stores each result as a row in a `results` table. The reference returned
//! for a row is `results:<rowid>`.

use crate::output::traits::{ResultSink, SinkError, SinkResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

/// SQL schema for the results database
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_key TEXT NOT NULL,
    content TEXT NOT NULL,
    stored_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_key ON results(item_key);
"#;

/// SQLite-backed result sink
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Opens or creates the results database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(SinkError)` - Failed to open database
    pub fn new(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;

        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> SinkResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SinkError::Unavailable(format!("Failed to lock database: {}", e)))
    }

    /// Loads the stored content for a reference returned by `save`
    pub fn load(&self, reference: &str) -> SinkResult<Option<(String, String)>> {
        let Some(id) = reference
            .strip_prefix("results:")
            .and_then(|id| id.parse::<i64>().ok())
        else {
            return Ok(None);
        };

        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT item_key, content FROM results WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// Counts stored results
    pub fn count(&self) -> SinkResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl<C: Serialize> ResultSink<C> for SqliteSink {
    fn save(&self, key: &str, content: &C) -> SinkResult<String> {
        let body = serde_json::to_string(content)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO results (item_key, content, stored_at) VALUES (?1, ?2, ?3)",
            params![key, body, Utc::now().to_rfc3339()],
        )?;
        Ok(format!("results:{}", conn.last_insert_rowid()))
    }
}
