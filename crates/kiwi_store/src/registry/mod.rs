//! Transaction-scoped triple registry.
//!
//! Before a transaction commits, the triples it created are invisible to
//! other connections. The registry closes that gap: it maps the node ids of
//! a statement (its [`RegistryKey`]) to the triple id handed out for it, so a
//! second request for the same statement, from the same or another
//! transaction, reuses the id instead of minting a duplicate.
//!
//! An entry is owned by the transactions that registered it. When a
//! transaction commits or rolls back it releases its ownership, and an entry
//! without owners disappears. Deleting a key drops the entry outright so a
//! deleted triple id is never handed out again.
//!
//! Strategies:
//! - [`LocalTripleRegistry`]: in-process maps
//! - [`CachingTripleRegistry`]: two named caches of the [`CacheManager`](crate::CacheManager)
//! - [`DatabaseTripleRegistry`]: a dedicated SQLite database

pub mod cached;
pub mod database;
pub mod local;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::node::TRANSIENT_ID;
use crate::triple::Triple;
use crate::Result;

pub use cached::CachingTripleRegistry;
pub use database::DatabaseTripleRegistry;
pub use local::LocalTripleRegistry;

/// The node ids of a statement: subject, predicate, object and context.
///
/// A missing or unpersisted node is represented by `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryKey {
    pub subject: i64,
    pub predicate: i64,
    pub object: i64,
    pub context: i64,
}

impl RegistryKey {
    pub fn new(subject: i64, predicate: i64, object: i64, context: i64) -> Self {
        Self {
            subject,
            predicate,
            object,
            context,
        }
    }

    /// Builds the key from the node ids of a triple.
    pub fn from_triple(triple: &Triple) -> Self {
        Self::new(
            triple.subject().id(),
            triple.predicate().id(),
            triple.object().id(),
            triple.context().map_or(TRANSIENT_ID, |c| c.id()),
        )
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.subject, self.predicate, self.object, self.context
        )
    }
}

/// A registered triple id and the transactions holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub triple_id: i64,
    pub owners: Vec<i64>,
}

impl RegistryEntry {
    pub(crate) fn new(triple_id: i64, txn_id: i64) -> Self {
        Self {
            triple_id,
            owners: vec![txn_id],
        }
    }

    pub(crate) fn add_owner(&mut self, txn_id: i64) {
        if !self.owners.contains(&txn_id) {
            self.owners.push(txn_id);
        }
    }

    /// Removes an owner. Returns `true` if no owners remain.
    pub(crate) fn release(&mut self, txn_id: i64) -> bool {
        self.owners.retain(|&owner| owner != txn_id);
        self.owners.is_empty()
    }
}

/// Registry of triple ids handed out by open transactions.
pub trait TripleRegistry: Send + Sync {
    /// Returns the triple id registered for `key`.
    fn lookup_key(&self, key: &RegistryKey) -> Result<Option<i64>>;

    /// Registers `triple_id` for `key` on behalf of transaction `txn_id`.
    ///
    /// Idempotent for the same key and transaction. A different transaction
    /// registering an existing key becomes a co-owner.
    fn register_key(&self, key: RegistryKey, txn_id: i64, triple_id: i64) -> Result<()>;

    /// Drops the entry for `key` regardless of its owners.
    fn delete_key(&self, key: &RegistryKey) -> Result<()>;

    /// Drops transaction `txn_id`'s ownership of all its keys.
    fn release_transaction(&self, txn_id: i64) -> Result<()>;

    /// Short name of the strategy, for logging.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every registry strategy must show.

    use super::*;

    pub fn check(registry: &dyn TripleRegistry) {
        let k1 = RegistryKey::new(1, 2, 3, 4);
        let k2 = RegistryKey::new(1, 2, 5, 4);

        // absent
        assert_eq!(registry.lookup_key(&k1).unwrap(), None);

        // registered, idempotent for the same transaction
        registry.register_key(k1, 100, 10).unwrap();
        registry.register_key(k1, 100, 10).unwrap();
        assert_eq!(registry.lookup_key(&k1).unwrap(), Some(10));

        // a second owner keeps the entry alive past the first release
        registry.register_key(k1, 200, 10).unwrap();
        registry.release_transaction(100).unwrap();
        assert_eq!(registry.lookup_key(&k1).unwrap(), Some(10));
        registry.release_transaction(200).unwrap();
        assert_eq!(registry.lookup_key(&k1).unwrap(), None);

        // delete drops the entry while its owner is still open
        registry.register_key(k2, 300, 11).unwrap();
        registry.delete_key(&k2).unwrap();
        assert_eq!(registry.lookup_key(&k2).unwrap(), None);
        registry.release_transaction(300).unwrap();

        // releasing an unknown transaction is a no-op
        registry.release_transaction(999).unwrap();
    }

    pub fn check_concurrent(registry: std::sync::Arc<dyn TripleRegistry>) {
        let handles: Vec<_> = (0..8i64)
            .map(|t| {
                let registry = std::sync::Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..50i64 {
                        let key = RegistryKey::new(t, i, 0, 0);
                        registry.register_key(key, t, t * 1000 + i).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for t in 0..8i64 {
            for i in 0..50i64 {
                let key = RegistryKey::new(t, i, 0, 0);
                assert_eq!(registry.lookup_key(&key).unwrap(), Some(t * 1000 + i));
            }
            registry.release_transaction(t).unwrap();
        }
        assert_eq!(registry.lookup_key(&RegistryKey::new(3, 3, 0, 0)).unwrap(), None);
    }
}
