//! The store handle.
//!
//! `KiWiStore` owns the pieces shared by all transactions: the cache
//! manager, the persistence layer with its connection pool and sequences,
//! the triple registry and the value factory. It is cheap to clone and can
//! be shared across threads; each thread opens its own transactions.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::caching::CacheManager;
use crate::config::{KiWiConfiguration, RegistryStrategy};
use crate::persistence::KiWiPersistence;
use crate::registry::{
    CachingTripleRegistry, DatabaseTripleRegistry, LocalTripleRegistry, TripleRegistry,
};
use crate::transaction::KiWiTransaction;
use crate::triple::Triple;
use crate::value_factory::KiWiValueFactory;
use crate::Result;

/// The triples added and removed by one committed transaction.
#[derive(Debug, Clone, Default)]
pub struct ChangeEvent {
    pub added: Vec<Triple>,
    pub removed: Vec<Triple>,
}

impl ChangeEvent {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A callback invoked after every commit that changed data.
pub type ChangeListener = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

struct StoreInner {
    config: KiWiConfiguration,
    caches: Arc<CacheManager>,
    persistence: Arc<KiWiPersistence>,
    value_factory: KiWiValueFactory,
    listeners: RwLock<Vec<ChangeListener>>,
}

/// A persistent RDF triple store.
///
/// # Examples
///
/// ```no_run
/// use kiwi_store::{KiWiConfiguration, KiWiStore, Node};
///
/// # fn main() -> kiwi_store::Result<()> {
/// let store = KiWiStore::open(KiWiConfiguration::sqlite("data.db"))?;
///
/// let mut txn = store.begin()?;
/// let alice = txn.create_uri("http://example.org/alice")?;
/// let name = txn.create_uri("http://xmlns.com/foaf/0.1/name")?;
/// let value = txn.create_literal("Alice")?;
/// txn.add_statement(&alice, &name, &value, None)?;
/// txn.commit()?;
///
/// store.shutdown()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct KiWiStore {
    inner: Arc<StoreInner>,
}

impl KiWiStore {
    /// Opens the store described by `config`, creating the database if it
    /// does not exist.
    pub fn open(config: KiWiConfiguration) -> Result<Self> {
        config.validate()?;

        let caches = Arc::new(CacheManager::new(&config.cache));
        let persistence = Arc::new(KiWiPersistence::open(&config, Arc::clone(&caches))?);
        let registry: Arc<dyn TripleRegistry> = match config.registry {
            RegistryStrategy::Local => Arc::new(LocalTripleRegistry::new()),
            RegistryStrategy::Cache => Arc::new(CachingTripleRegistry::new(&caches)?),
            RegistryStrategy::Database => Arc::new(DatabaseTripleRegistry::open(
                config.registry_path(),
                config.busy_timeout(),
            )?),
        };
        let value_factory = KiWiValueFactory::new(
            Arc::clone(&caches),
            Arc::clone(&registry),
            config.default_context.clone(),
        );

        log::info!(
            "opened KiWi store at {} with {} triple registry",
            config.database_path.display(),
            registry.name()
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                caches,
                persistence,
                value_factory,
                listeners: RwLock::new(Vec::new()),
            }),
        })
    }

    /// Starts a transaction with its own database connection.
    pub fn begin(&self) -> Result<KiWiTransaction> {
        let conn = self.inner.persistence.connection()?;
        log::trace!("begin transaction {}", conn.transaction_id());
        Ok(KiWiTransaction::new(self.clone(), conn))
    }

    /// Registers a callback invoked after each commit that added or removed
    /// triples.
    pub fn add_change_listener<F>(&self, listener: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.write().push(Box::new(listener));
    }

    pub(crate) fn notify(&self, event: &ChangeEvent) {
        for listener in self.inner.listeners.read().iter() {
            listener(event);
        }
    }

    /// Persists the sequences and empties all caches. Transactions still
    /// open keep working against the database.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.persistence.shutdown()?;
        self.inner.caches.shutdown();
        log::info!(
            "shut down KiWi store at {}",
            self.inner.config.database_path.display()
        );
        Ok(())
    }

    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.inner.caches
    }

    pub fn registry(&self) -> &Arc<dyn TripleRegistry> {
        self.inner.value_factory.registry()
    }

    pub fn value_factory(&self) -> &KiWiValueFactory {
        &self.inner.value_factory
    }

    pub fn persistence(&self) -> &Arc<KiWiPersistence> {
        &self.inner.persistence
    }

    pub fn config(&self) -> &KiWiConfiguration {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(strategy: RegistryStrategy) -> (TempDir, KiWiStore) {
        let dir = TempDir::new().unwrap();
        let mut config = KiWiConfiguration::sqlite(dir.path().join("store.db"));
        config.registry = strategy;
        let store = KiWiStore::open(config).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_with_each_registry() {
        for (strategy, name) in [
            (RegistryStrategy::Local, "local"),
            (RegistryStrategy::Cache, "cache"),
            (RegistryStrategy::Database, "database"),
        ] {
            let (dir, store) = open(strategy);
            assert_eq!(store.registry().name(), name);
            if strategy == RegistryStrategy::Database {
                assert!(dir.path().join("store.db.registry").exists());
            }
            store.shutdown().unwrap();
        }
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");

        let id = {
            let store = KiWiStore::open(KiWiConfiguration::sqlite(&path)).unwrap();
            let mut txn = store.begin().unwrap();
            let s = txn.create_uri("http://example.org/s").unwrap();
            let p = txn.create_uri("http://example.org/p").unwrap();
            let o = txn.create_literal(42i64).unwrap();
            let t = txn.add_statement(&s, &p, &o, None).unwrap();
            txn.commit().unwrap();
            store.shutdown().unwrap();
            t.id()
        };

        let store = KiWiStore::open(KiWiConfiguration::sqlite(&path)).unwrap();
        let mut txn = store.begin().unwrap();
        let s = txn.create_uri("http://example.org/s").unwrap();
        let statements = txn.get_statements(Some(&s), None, None, None, false).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].id(), id);
        assert_eq!(statements[0].object().as_integer(), Some(42));

        // sequences continue after the stored ids
        let p = txn.create_uri("http://example.org/p").unwrap();
        let o = txn.create_literal(43i64).unwrap();
        let t = txn.add_statement(&s, &p, &o, None).unwrap();
        assert!(t.id() > id);
        txn.commit().unwrap();
    }

    #[test]
    fn test_clone_shares_listeners() {
        let (_dir, store) = open(RegistryStrategy::Local);
        let seen = Arc::new(parking_lot::Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        store.clone().add_change_listener(move |event| {
            *counter.lock() += event.added.len();
        });

        let mut txn = store.begin().unwrap();
        let s = txn.create_uri("http://example.org/s").unwrap();
        let p = txn.create_uri("http://example.org/p").unwrap();
        txn.add_statement(&s, &p, &s, None).unwrap();
        txn.commit().unwrap();
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn test_cache_registry_needs_cache_backend() {
        let dir = TempDir::new().unwrap();
        let mut config = KiWiConfiguration::sqlite(dir.path().join("store.db"));
        config.registry = RegistryStrategy::Cache;
        config.cache = crate::config::CacheConfig::disabled();
        assert!(matches!(KiWiStore::open(config.clone()), Err(crate::Error::Config(_))));

        // the other registries keep statement identity without caches
        config.registry = RegistryStrategy::Local;
        let store = KiWiStore::open(config).unwrap();
        let mut setup = store.begin().unwrap();
        let s = setup.create_uri("http://example.org/s").unwrap();
        setup.create_uri(crate::config::DEFAULT_CONTEXT).unwrap();
        setup.commit().unwrap();

        let mut t1 = store.begin().unwrap();
        let mut t2 = store.begin().unwrap();
        let a = t1.create_statement(&s, &s, &s, None).unwrap();
        let b = t1.create_statement(&s, &s, &s, None).unwrap();
        let c = t2.create_statement(&s, &s, &s, None).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), c.id());
        t1.rollback().unwrap();
        t2.rollback().unwrap();
    }
}
