//! JSON file storage implementation
//!
//! This module provides a single-file snapshot implementation of the
//! `StateStore` trait. Every save rewrites the whole document through a
//! temporary file in the same directory followed by a rename, so readers see
//! either the previous snapshot or the new one.

use crate::storage::schema::{decode, encode, SnapshotMeta};
use crate::storage::traits::{StateMap, StateStore, StorageError, StorageResult};
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Snapshot-file state store
pub struct JsonStateStore {
    path: PathBuf,
    config_hash: Option<String>,

    /// Guards writes; also carries metadata between load and save
    meta: Mutex<SnapshotMeta>,
}

impl JsonStateStore {
    /// Creates a new JsonStateStore
    ///
    /// The parent directory of `path` is created if it does not exist.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the snapshot file
    ///
    /// # Returns
    ///
    /// * `Ok(JsonStateStore)` - Store ready for use
    /// * `Err(StorageError)` - Failed to create the directory
    pub fn new(path: &Path) -> StorageResult<Self> {
        std::fs::create_dir_all(parent_dir(path))?;

        Ok(Self {
            path: path.to_path_buf(),
            config_hash: None,
            meta: Mutex::new(SnapshotMeta::default()),
        })
    }

    /// Records the configuration hash in every snapshot written from now on
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Metadata from the last load or save
    pub fn meta(&self) -> SnapshotMeta {
        match self.meta.lock() {
            Ok(meta) => meta.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn write_snapshot(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut tmp = NamedTempFile::new_in(parent_dir(&self.path))?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> StorageResult<StateMap> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No state file at {}, starting empty", self.path.display());
                return Ok(StateMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        let (meta, items) = decode(&bytes)?;

        if let (Some(ours), Some(theirs)) = (&self.config_hash, &meta.config_hash) {
            if ours != theirs {
                tracing::info!(
                    "Configuration changed since the state was written (was {}, now {})",
                    theirs,
                    ours
                );
            }
        }

        let mut guard = self.meta.lock().map_err(|_| StorageError::Poisoned)?;
        *guard = meta;

        tracing::debug!(
            "Loaded {} records from {}",
            items.len(),
            self.path.display()
        );
        Ok(items)
    }

    fn save_all(&self, items: &StateMap) -> StorageResult<()> {
        let mut meta = self.meta.lock().map_err(|_| StorageError::Poisoned)?;

        let now = Utc::now();
        let mut next = meta.clone();
        next.created_at.get_or_insert(now);
        next.updated_at = Some(now);
        if self.config_hash.is_some() {
            next.config_hash = self.config_hash.clone();
        }

        let bytes = encode(items, &next)?;
        self.write_snapshot(&bytes)?;

        *meta = next;
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
