//! Triple registry kept in the cache backend.

use parking_lot::Mutex;
use std::sync::Arc;

use super::{RegistryEntry, RegistryKey, TripleRegistry};
use crate::caching::{CacheManager, KiWiCache};
use crate::config::CacheBackend;
use crate::{Error, Result};

pub const REGISTRY_KEYS_CACHE: &str = "registry.keys";
pub const REGISTRY_TRANSACTIONS_CACHE: &str = "registry.transactions";

/// Registry stored in two named caches: entries by key and keys by
/// transaction.
///
/// Entries never expire while idle; they are only evicted by the size bound
/// of `CacheConfig::registry`, and an evicted entry degrades to a database
/// lookup by the value factory. Updates are read-modify-write on cached
/// values and run under one mutex.
pub struct CachingTripleRegistry {
    keys: Arc<dyn KiWiCache<RegistryKey, RegistryEntry>>,
    transactions: Arc<dyn KiWiCache<i64, Vec<RegistryKey>>>,
    lock: Mutex<()>,
}

impl CachingTripleRegistry {
    /// # Errors
    ///
    /// Returns `Error::Config` if the cache backend is disabled.
    pub fn new(caches: &CacheManager) -> Result<Self> {
        let config = caches.config();
        if config.backend == CacheBackend::Disabled {
            return Err(Error::Config(
                "the cache registry needs an enabled cache backend".into(),
            ));
        }
        Ok(Self {
            keys: caches.get_or_create_with_policy(REGISTRY_KEYS_CACHE, config.registry)?,
            transactions: caches
                .get_or_create_with_policy(REGISTRY_TRANSACTIONS_CACHE, config.registry)?,
            lock: Mutex::new(()),
        })
    }
}

impl TripleRegistry for CachingTripleRegistry {
    fn lookup_key(&self, key: &RegistryKey) -> Result<Option<i64>> {
        Ok(self.keys.get(key).map(|e| e.triple_id))
    }

    fn register_key(&self, key: RegistryKey, txn_id: i64, triple_id: i64) -> Result<()> {
        let _guard = self.lock.lock();

        let entry = match self.keys.get(&key) {
            Some(mut entry) => {
                entry.triple_id = triple_id;
                entry.add_owner(txn_id);
                entry
            }
            None => RegistryEntry::new(triple_id, txn_id),
        };
        self.keys.put(key, entry);

        let mut owned = self.transactions.get(&txn_id).unwrap_or_default();
        if !owned.contains(&key) {
            owned.push(key);
            self.transactions.put(txn_id, owned);
        }
        Ok(())
    }

    fn delete_key(&self, key: &RegistryKey) -> Result<()> {
        let _guard = self.lock.lock();
        self.keys.remove(key);
        Ok(())
    }

    fn release_transaction(&self, txn_id: i64) -> Result<()> {
        let _guard = self.lock.lock();

        let Some(owned) = self.transactions.get(&txn_id) else {
            return Ok(());
        };
        self.transactions.remove(&txn_id);

        for key in owned {
            if let Some(mut entry) = self.keys.get(&key) {
                if entry.release(txn_id) {
                    self.keys.remove(&key);
                } else {
                    self.keys.put(key, entry);
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cache"
    }
}
