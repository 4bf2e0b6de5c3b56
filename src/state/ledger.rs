//! Shared in-memory state with write-through persistence
//!
//! The ledger owns the live `key → ItemState` mapping for one run. Every
//! mutation happens under its lock and is followed by a full snapshot write
//! while the lock is still held, so concurrent completions on different keys
//! cannot lose each other's updates and snapshots are written in mutation order.
//!
//! Snapshot writes are synchronous file I/O. Inside a multi-threaded tokio
//! runtime they run through `block_in_place`, so other tasks move off the
//! worker thread while it waits on the disk.

use crate::state::ItemState;
use crate::storage::{StateMap, StateStore, StorageError, StorageResult};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::{Handle, RuntimeFlavor};

pub struct StateLedger {
    items: Mutex<StateMap>,
    store: Arc<dyn StateStore>,
}

impl StateLedger {
    pub fn new(items: StateMap, store: Arc<dyn StateStore>) -> Self {
        Self {
            items: Mutex::new(items),
            store,
        }
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, StateMap>> {
        self.items.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Returns a copy of one record
    pub fn get(&self, key: &str) -> Option<ItemState> {
        self.lock().ok().and_then(|items| items.get(key).cloned())
    }

    /// Mutates one record and persists the result
    ///
    /// A record is created in `Pending` if the key has never been seen. The
    /// in-memory change stays applied even if the write fails.
    pub fn update<R>(
        &self,
        key: &str,
        mutate: impl FnOnce(&mut ItemState) -> R,
    ) -> StorageResult<R> {
        let mut items = self.lock()?;
        let state = items
            .entry(key.to_string())
            .or_insert_with(|| ItemState::new(key));
        let result = mutate(state);
        blocking(|| self.store.save_all(&items))?;
        Ok(result)
    }

    /// Writes the current mapping to the store
    pub fn flush(&self) -> StorageResult<()> {
        let items = self.lock()?;
        blocking(|| self.store.save_all(&items))?;
        tracing::debug!("Flushed {} records", items.len());
        Ok(())
    }
}

/// Runs a blocking write, handing this worker's other tasks to the rest of
/// the pool when called from a multi-threaded runtime
fn blocking<R>(write: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(write)
        }
        // block_in_place panics on a current-thread runtime
        _ => write(),
    }
}
