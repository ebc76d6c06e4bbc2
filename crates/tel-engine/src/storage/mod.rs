//! Durable storage for chain entries.
//!
//! The engine writes every entry through a [`StorageBackend`] before it
//! becomes visible in memory, and reloads plus re-verifies the whole chain
//! from it on start-up.

mod file;
mod memory;

use std::io;
use std::sync::Arc;

use tel_chain::ChainEntry;
use tel_types::Hash;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Errors from storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored bytes failed their integrity check.
    #[error("corrupt storage at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// The backend refused the write; nothing from the call was persisted.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage lock poisoned")]
    LockPoisoned,
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StorageError>;

/// Append-only persistence for chain entries.
///
/// Implementations must satisfy:
/// - Entries are returned by `load_all_entries` in the order they were saved.
/// - `save_batch` is all-or-nothing: on error none of the batch is visible.
/// - Entries are never modified or removed once saved.
pub trait StorageBackend: Send + Sync {
    fn save_entry(&self, entry: &ChainEntry) -> StoreResult<()>;

    /// Persist several entries atomically.
    ///
    /// The default writes one entry at a time and is only atomic if a single
    /// write cannot fail part-way; durable backends override it.
    fn save_batch(&self, entries: &[ChainEntry]) -> StoreResult<()> {
        entries.iter().try_for_each(|entry| self.save_entry(entry))
    }

    fn load_all_entries(&self) -> StoreResult<Vec<ChainEntry>>;

    fn load_entry(&self, hash: &Hash) -> StoreResult<Option<ChainEntry>>;

    fn entry_count(&self) -> StoreResult<usize>;

    fn latest_hash(&self) -> StoreResult<Option<Hash>>;
}

impl<S: StorageBackend + ?Sized> StorageBackend for Arc<S> {
    fn save_entry(&self, entry: &ChainEntry) -> StoreResult<()> {
        (**self).save_entry(entry)
    }

    fn save_batch(&self, entries: &[ChainEntry]) -> StoreResult<()> {
        (**self).save_batch(entries)
    }

    fn load_all_entries(&self) -> StoreResult<Vec<ChainEntry>> {
        (**self).load_all_entries()
    }

    fn load_entry(&self, hash: &Hash) -> StoreResult<Option<ChainEntry>> {
        (**self).load_entry(hash)
    }

    fn entry_count(&self) -> StoreResult<usize> {
        (**self).entry_count()
    }

    fn latest_hash(&self) -> StoreResult<Option<Hash>> {
        (**self).latest_hash()
    }
}
