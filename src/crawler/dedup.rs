//! Two-tier duplicate detection
//!
//! A candidate is a duplicate when its EAN is already in the durable catalog,
//! or when this run already accepted a record with the same EAN. The in-run
//! tier lives only in memory; the moderation queue's unique EAN index covers
//! what it misses across runs.

use crate::product::Ean;
use crate::storage::{Storage, StorageResult};
use std::collections::HashSet;

/// EANs accepted during the current run
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: HashSet<Ean>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the durable catalog first, then the in-run cache
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The EAN is known to either tier
    /// * `Ok(false)` - The EAN is new
    /// * `Err(StorageError)` - The catalog could not be queried
    pub fn is_duplicate<S: Storage + ?Sized>(&self, storage: &S, ean: &Ean) -> StorageResult<bool> {
        if storage.catalog_contains(ean)? {
            return Ok(true);
        }
        Ok(self.seen.contains(ean))
    }

    /// Records an EAN whose submission reached the sink
    pub fn remember(&mut self, ean: Ean) {
        self.seen.insert(ean);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    fn ean(s: &str) -> Ean {
        Ean::parse(s).unwrap()
    }

    #[test]
    fn test_catalog_member_is_duplicate() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .insert_catalog_product("4001234567890", "Happy Paws", "Adult Lamb")
            .unwrap();
        let index = DedupIndex::new();

        assert!(index.is_duplicate(&storage, &ean("4001234567890")).unwrap());
        assert!(!index.is_duplicate(&storage, &ean("4001234567891")).unwrap());
    }

    #[test]
    fn test_in_run_tier() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let mut index = DedupIndex::new();
        let key = ean("4001234567890");

        assert!(!index.is_duplicate(&storage, &key).unwrap());
        index.remember(key.clone());
        assert!(index.is_duplicate(&storage, &key).unwrap());
        assert_eq!(index.len(), 1);
    }
}
