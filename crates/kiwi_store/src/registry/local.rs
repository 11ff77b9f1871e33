//! In-process triple registry.

use dashmap::DashMap;
use std::collections::HashSet;

use super::{RegistryEntry, RegistryKey, TripleRegistry};
use crate::Result;

/// Registry held in concurrent maps inside the process.
///
/// Visible to every transaction of the same store instance, which is all a
/// single-process SQLite deployment needs.
#[derive(Default)]
pub struct LocalTripleRegistry {
    entries: DashMap<RegistryKey, RegistryEntry>,
    transactions: DashMap<i64, HashSet<RegistryKey>>,
}

impl LocalTripleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TripleRegistry for LocalTripleRegistry {
    fn lookup_key(&self, key: &RegistryKey) -> Result<Option<i64>> {
        Ok(self.entries.get(key).map(|e| e.triple_id))
    }

    fn register_key(&self, key: RegistryKey, txn_id: i64, triple_id: i64) -> Result<()> {
        self.entries
            .entry(key)
            .and_modify(|e| {
                e.triple_id = triple_id;
                e.add_owner(txn_id);
            })
            .or_insert_with(|| RegistryEntry::new(triple_id, txn_id));
        self.transactions.entry(txn_id).or_default().insert(key);
        Ok(())
    }

    fn delete_key(&self, key: &RegistryKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn release_transaction(&self, txn_id: i64) -> Result<()> {
        let Some((_, keys)) = self.transactions.remove(&txn_id) else {
            return Ok(());
        };
        for key in keys {
            self.entries
                .remove_if_mut(&key, |_, entry| entry.release(txn_id));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
