//! One-time importer for state files written before the versioned snapshot
//!
//! Two historical shapes are understood:
//!
//! - a JSON array of URLs that were fully processed
//! - an object with a `links` array of `{url, status, updatedAt, ...}` entries
//!
//! Imported completions have no stored result reference of their own, so they
//! carry `LEGACY_RESULT_REF` and a single synthesized successful attempt.

use crate::state::{AttemptRecord, ItemState};
use crate::storage::traits::{StateMap, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Result reference given to items imported as completed
pub const LEGACY_RESULT_REF: &str = "legacy";

#[derive(Debug, Deserialize)]
struct LegacyLink {
    url: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "updatedAt")]
    updated_at: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Reads a legacy state file and converts it to the current record mapping
pub fn import_legacy(path: &Path) -> StorageResult<StateMap> {
    let bytes = std::fs::read(path)?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::Legacy(format!("not valid JSON: {}", e)))?;
    convert_legacy(value, Utc::now())
}

/// Converts an already parsed legacy document
pub fn convert_legacy(value: Value, now: DateTime<Utc>) -> StorageResult<StateMap> {
    match value {
        Value::Array(entries) => {
            let mut items = StateMap::new();
            for entry in entries {
                let url = entry.as_str().ok_or_else(|| {
                    StorageError::Legacy(format!("expected a URL string, found {}", entry))
                })?;
                items
                    .entry(url.to_string())
                    .or_insert_with(|| imported_completion(url, now));
            }
            Ok(items)
        }
        Value::Object(mut object) => {
            let links = object
                .remove("links")
                .ok_or_else(|| StorageError::Legacy("object has no `links` array".to_string()))?;
            let links: Vec<LegacyLink> = serde_json::from_value(links)
                .map_err(|e| StorageError::Legacy(format!("malformed `links`: {}", e)))?;

            let mut items = StateMap::new();
            for link in links {
                let at = link
                    .updated_at
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or(now);
                let state = match link.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
                    Some("completed") => imported_completion(&link.url, at),
                    Some("failed") => imported_failure(
                        &link.url,
                        link.error.unwrap_or_else(|| "failed before import".to_string()),
                        at,
                    ),
                    _ => ItemState::new(link.url.clone()),
                };
                items.insert(link.url, state);
            }
            Ok(items)
        }
        other => Err(StorageError::Legacy(format!(
            "unrecognized document of type {}",
            json_type(&other)
        ))),
    }
}

fn imported_completion(url: &str, at: DateTime<Utc>) -> ItemState {
    let mut state = ItemState::new(url);
    state.begin(at);
    state.record_attempt(AttemptRecord::success(1, at, at));
    state.complete(LEGACY_RESULT_REF.to_string(), at);
    state
}

fn imported_failure(url: &str, error: String, at: DateTime<Utc>) -> ItemState {
    let mut state = ItemState::new(url);
    state.begin(at);
    state.record_attempt(AttemptRecord::failure(1, at, at, error.clone()));
    state.fail(crate::state::ItemStatus::FailedRetryable, error, at);
    state
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
