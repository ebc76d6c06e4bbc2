use std::sync::{Mutex, RwLock};

use tel_chain::ChainEntry;
use tel_types::Hash;

use super::{StorageBackend, StorageError, StoreResult};

/// In-memory storage backend.
///
/// Intended for tests and embedding. A write budget can be set with
/// [`MemoryStorage::fail_after`] to simulate a backend that fails part-way
/// through a batch.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<Vec<ChainEntry>>,
    /// Remaining entry writes before the backend starts failing.
    budget: Mutex<Option<usize>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with `entries`, e.g. to simulate an existing ledger.
    pub fn from_entries(entries: Vec<ChainEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
            budget: Mutex::new(None),
        }
    }

    /// Accept `writes` more entries, then fail every write.
    pub fn fail_after(&self, writes: usize) -> StoreResult<()> {
        *self.budget.lock().map_err(|_| StorageError::LockPoisoned)? = Some(writes);
        Ok(())
    }

    /// Remove any write budget.
    pub fn heal(&self) -> StoreResult<()> {
        *self.budget.lock().map_err(|_| StorageError::LockPoisoned)? = None;
        Ok(())
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.entry_count()
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.entry_count()? == 0)
    }

    /// Take one unit of write budget.
    fn charge(&self) -> StoreResult<()> {
        let mut budget = self.budget.lock().map_err(|_| StorageError::LockPoisoned)?;
        match budget.as_mut() {
            Some(0) => Err(StorageError::Unavailable("write budget exhausted".into())),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn save_entry(&self, entry: &ChainEntry) -> StoreResult<()> {
        self.charge()?;
        self.entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .push(entry.clone());
        Ok(())
    }

    fn save_batch(&self, batch: &[ChainEntry]) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let snapshot = entries.len();
        for entry in batch {
            if let Err(e) = self.charge() {
                entries.truncate(snapshot);
                return Err(e);
            }
            entries.push(entry.clone());
        }
        Ok(())
    }

    fn load_all_entries(&self) -> StoreResult<Vec<ChainEntry>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .clone())
    }

    fn load_entry(&self, hash: &Hash) -> StoreResult<Option<ChainEntry>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.iter().find(|e| e.hash == *hash).cloned())
    }

    fn entry_count(&self) -> StoreResult<usize> {
        Ok(self
            .entries
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .len())
    }

    fn latest_hash(&self) -> StoreResult<Option<Hash>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.last().map(|e| e.hash))
    }
}
