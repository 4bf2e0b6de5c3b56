//! Item list loading
//!
//! The item list is a JSON array of strings. Duplicates are collapsed with the
//! first occurrence winning, so admission order follows the file.

use crate::InputError;
use std::collections::HashSet;
use std::path::Path;

/// Loads and deduplicates the item list at `path`
///
/// # Returns
///
/// * `Ok(Vec<String>)` - Keys in file order, without duplicates
/// * `Err(InputError::Io)` - The file could not be read
/// * `Err(InputError::InvalidInputFormat)` - The content is not an array of strings
pub fn load_items(path: &Path) -> Result<Vec<String>, InputError> {
    let content = std::fs::read_to_string(path)?;
    parse_items(&content)
}

/// Parses an item list from JSON text
pub fn parse_items(content: &str) -> Result<Vec<String>, InputError> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| InputError::InvalidInputFormat(format!("not valid JSON: {}", e)))?;

    let entries = value
        .as_array()
        .ok_or_else(|| InputError::InvalidInputFormat("expected a JSON array".to_string()))?;

    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let key = entry.as_str().ok_or_else(|| {
            InputError::InvalidInputFormat(format!("entry {} is not a string", index))
        })?;

        if key.trim().is_empty() {
            return Err(InputError::InvalidInputFormat(format!(
                "entry {} is empty",
                index
            )));
        }

        if seen.insert(key) {
            keys.push(key.to_string());
        }
    }

    if keys.len() < entries.len() {
        tracing::info!(
            "Collapsed {} duplicate items",
            entries.len() - keys.len()
        );
    }

    Ok(keys)
}
