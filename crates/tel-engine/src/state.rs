use std::collections::HashMap;

use tel_chain::ChainEntry;
use tel_types::{Hash, Record};

/// In-memory chain index: entries in append order plus hash and id lookups.
///
/// Only the engine mutates it, inside its single-writer section.
#[derive(Debug, Default, Clone)]
pub struct LedgerState {
    entries: Vec<ChainEntry>,
    by_hash: HashMap<Hash, usize>,
    by_id: HashMap<String, usize>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` at the tip. The caller has already linked it.
    pub fn push(&mut self, entry: ChainEntry) {
        let index = self.entries.len();
        self.by_hash.insert(entry.hash, index);
        self.by_id.insert(entry.record.id.clone(), index);
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&ChainEntry> {
        self.entries.last()
    }

    pub fn latest_hash(&self) -> Option<Hash> {
        self.latest().map(|e| e.hash)
    }

    pub fn entry(&self, hash: &Hash) -> Option<&ChainEntry> {
        self.by_hash.get(hash).map(|&i| &self.entries[i])
    }

    pub fn entry_by_id(&self, id: &str) -> Option<&ChainEntry> {
        self.by_id.get(id).map(|&i| &self.entries[i])
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Position of the entry with `id` in append order.
    pub fn position_of_id(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn position_of_hash(&self, hash: &Hash) -> Option<usize> {
        self.by_hash.get(hash).copied()
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().map(|e| &e.record)
    }
}
