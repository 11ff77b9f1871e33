//! Caches in front of the persistence layer.
//!
//! Every cache is a [`KiWiCache`], a plain key-value map with no knowledge of
//! the database. A miss never means a value does not exist; callers fall back
//! to the persistence layer. The [`CacheManager`] owns the seven caches the
//! store itself uses and hands out further named caches on request (the
//! cache-backed triple registry is built on two of them).
//!
//! ```text
//! ┌──────────────────────── CacheManager ────────────────────────┐
//! │ node (id)   triple (id)   uri   bnode   literal   ns-uri/pfx │
//! │ named: "registry.keys", "registry.transactions", ...         │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ backend
//!               ┌────────────────┴────────────────┐
//!           LocalCache (moka)             PassThroughCache
//! ```

use moka::sync::Cache;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::{CacheBackend, CacheConfig, CachePolicy};
use crate::namespace::Namespace;
use crate::node::{LiteralKey, Node};
use crate::triple::Triple;
use crate::{Error, Result};

/// A key-value cache.
///
/// Implementations must be safe for concurrent use: concurrent reads never
/// block and writes for different keys do not block each other. Writes for
/// the same key are last-write-wins.
pub trait KiWiCache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    fn put(&self, key: K, value: V);

    fn remove(&self, key: &K);

    fn clear(&self);

    /// Number of entries currently held.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn name(&self) -> &str;
}

/// A bounded in-process cache whose entries expire after a period without
/// access.
pub struct LocalCache<K, V> {
    name: String,
    inner: Cache<K, V>,
}

impl<K, V> LocalCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, policy: CachePolicy) -> Self {
        let name = name.into();
        let mut builder = Cache::builder().name(&name).max_capacity(policy.max_entries);
        if policy.idle_seconds > 0 {
            builder = builder.time_to_idle(policy.idle());
        }
        let inner = builder.build();
        Self { name, inner }
    }
}

impl<K, V> KiWiCache<K, V> for LocalCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    fn put(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    fn remove(&self, key: &K) {
        self.inner.invalidate(key);
    }

    fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A cache that stores nothing.
pub struct PassThroughCache<K, V> {
    name: String,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> PassThroughCache<K, V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }
}

impl<K, V> KiWiCache<K, V> for PassThroughCache<K, V> {
    fn get(&self, _key: &K) -> Option<V> {
        None
    }

    fn put(&self, _key: K, _value: V) {}

    fn remove(&self, _key: &K) {}

    fn clear(&self) {}

    fn len(&self) -> u64 {
        0
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub const NODE_CACHE: &str = "node-cache";
pub const TRIPLE_CACHE: &str = "triple-cache";
pub const URI_CACHE: &str = "uri-cache";
pub const BNODE_CACHE: &str = "bnode-cache";
pub const LITERAL_CACHE: &str = "literal-cache";
pub const NAMESPACE_URI_CACHE: &str = "namespace-uri-cache";
pub const NAMESPACE_PREFIX_CACHE: &str = "namespace-prefix-cache";

pub type SharedCache<K, V> = Arc<dyn KiWiCache<K, V>>;

/// A type-erased named cache. `handle` holds a `SharedCache<K, V>`.
struct NamedCache {
    handle: Box<dyn Any + Send + Sync>,
    clear: Box<dyn Fn() + Send + Sync>,
}

/// Owner of all caches of a store.
///
/// # Examples
///
/// ```
/// use kiwi_store::{CacheConfig, CacheManager};
///
/// let caches = CacheManager::new(&CacheConfig::default());
/// let counters = caches.get_or_create::<String, u64>("counters").unwrap();
/// counters.put("hits".to_string(), 1);
/// assert_eq!(counters.get(&"hits".to_string()), Some(1));
///
/// // Same name, different types
/// assert!(caches.get_or_create::<u64, u64>("counters").is_err());
/// ```
pub struct CacheManager {
    config: CacheConfig,
    node_cache: SharedCache<i64, Node>,
    triple_cache: SharedCache<i64, Triple>,
    uri_cache: SharedCache<String, Node>,
    bnode_cache: SharedCache<String, Node>,
    literal_cache: SharedCache<LiteralKey, Node>,
    namespace_uri_cache: SharedCache<String, Namespace>,
    namespace_prefix_cache: SharedCache<String, Namespace>,
    named: RwLock<HashMap<String, NamedCache>>,
}

impl CacheManager {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            node_cache: build(config.backend, NODE_CACHE, config.node),
            triple_cache: build(config.backend, TRIPLE_CACHE, config.triple),
            uri_cache: build(config.backend, URI_CACHE, config.uri),
            bnode_cache: build(config.backend, BNODE_CACHE, config.bnode),
            literal_cache: build(config.backend, LITERAL_CACHE, config.literal),
            namespace_uri_cache: build(config.backend, NAMESPACE_URI_CACHE, config.namespace_uri),
            namespace_prefix_cache: build(
                config.backend,
                NAMESPACE_PREFIX_CACHE,
                config.namespace_prefix,
            ),
            named: RwLock::new(HashMap::new()),
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Nodes by surrogate id.
    pub fn node_cache(&self) -> &SharedCache<i64, Node> {
        &self.node_cache
    }

    /// Triples by surrogate id.
    pub fn triple_cache(&self) -> &SharedCache<i64, Triple> {
        &self.triple_cache
    }

    /// URI nodes by URI string.
    pub fn uri_cache(&self) -> &SharedCache<String, Node> {
        &self.uri_cache
    }

    /// Blank nodes by label.
    pub fn bnode_cache(&self) -> &SharedCache<String, Node> {
        &self.bnode_cache
    }

    /// Literals by content, language and datatype.
    pub fn literal_cache(&self) -> &SharedCache<LiteralKey, Node> {
        &self.literal_cache
    }

    pub fn namespace_uri_cache(&self) -> &SharedCache<String, Namespace> {
        &self.namespace_uri_cache
    }

    pub fn namespace_prefix_cache(&self) -> &SharedCache<String, Namespace> {
        &self.namespace_prefix_cache
    }

    /// Stores a persisted node in the id cache and in its natural key cache.
    pub fn cache_node(&self, node: &Node) {
        if !node.is_persisted() {
            return;
        }
        self.node_cache.put(node.id(), node.clone());
        match node {
            Node::Uri(n) => self.uri_cache.put(n.uri().to_string(), node.clone()),
            Node::BNode(n) => self.bnode_cache.put(n.label().to_string(), node.clone()),
            _ => {
                if let Some(key) = node.literal_key() {
                    self.literal_cache.put(key, node.clone());
                }
            }
        }
    }

    /// Stores a persisted triple in the triple cache.
    pub fn cache_triple(&self, triple: &Triple) {
        if triple.is_persisted() {
            self.triple_cache.put(triple.id(), triple.clone());
        }
    }

    pub fn cache_namespace(&self, ns: &Namespace) {
        self.namespace_prefix_cache.put(ns.prefix.clone(), ns.clone());
        self.namespace_uri_cache.put(ns.uri.clone(), ns.clone());
    }

    pub fn evict_namespace(&self, ns: &Namespace) {
        self.namespace_prefix_cache.remove(&ns.prefix);
        self.namespace_uri_cache.remove(&ns.uri);
    }

    /// Returns the named cache `name`, creating it with the default named
    /// policy on first use.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cache` if a cache of that name exists with different
    /// key or value types.
    pub fn get_or_create<K, V>(&self, name: &str) -> Result<SharedCache<K, V>>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.get_or_create_with_policy(name, self.config.default_named)
    }

    /// Like [`get_or_create`](Self::get_or_create), with `policy` applied if
    /// the cache does not exist yet.
    pub fn get_or_create_with_policy<K, V>(
        &self,
        name: &str,
        policy: CachePolicy,
    ) -> Result<SharedCache<K, V>>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        if let Some(entry) = self.named.read().get(name) {
            return downcast(name, entry);
        }

        let mut named = self.named.write();
        if let Some(entry) = named.get(name) {
            return downcast(name, entry);
        }

        let cache: SharedCache<K, V> = build(self.config.backend, name, policy);
        let for_clear = Arc::clone(&cache);
        named.insert(
            name.to_string(),
            NamedCache {
                handle: Box::new(Arc::clone(&cache)),
                clear: Box::new(move || for_clear.clear()),
            },
        );
        log::debug!("created named cache {}", name);
        Ok(cache)
    }

    /// Names of the named caches created so far.
    pub fn named_caches(&self) -> Vec<String> {
        self.named.read().keys().cloned().collect()
    }

    /// Empties every cache, named caches included.
    pub fn clear(&self) {
        self.node_cache.clear();
        self.triple_cache.clear();
        self.uri_cache.clear();
        self.bnode_cache.clear();
        self.literal_cache.clear();
        self.namespace_uri_cache.clear();
        self.namespace_prefix_cache.clear();
        for entry in self.named.read().values() {
            (entry.clear)();
        }
    }

    /// Empties every cache and forgets the named caches.
    pub fn shutdown(&self) {
        self.clear();
        self.named.write().clear();
    }
}

fn build<K, V>(backend: CacheBackend, name: &str, policy: CachePolicy) -> SharedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    match backend {
        CacheBackend::Local => Arc::new(LocalCache::new(name, policy)),
        CacheBackend::Disabled => Arc::new(PassThroughCache::new(name)),
    }
}

fn downcast<K, V>(name: &str, entry: &NamedCache) -> Result<SharedCache<K, V>>
where
    K: 'static,
    V: 'static,
{
    entry
        .handle
        .downcast_ref::<SharedCache<K, V>>()
        .cloned()
        .ok_or_else(|| {
            Error::Cache(format!(
                "cache {} exists with different key or value types",
                name
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_cache() {
        let cache: LocalCache<String, i64> = LocalCache::new("test", CachePolicy::new(10, 60));
        cache.put("a".into(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.len(), 1);

        cache.remove(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);

        cache.put("b".into(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.name(), "test");
    }

    #[test]
    fn test_pass_through_cache() {
        let cache: PassThroughCache<i64, String> = PassThroughCache::new("off");
        cache.put(1, "x".into());
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_cache_node_fills_natural_key_caches() {
        let caches = CacheManager::new(&CacheConfig::default());
        let mut node = Node::uri("http://example.org/a");
        caches.cache_node(&node);
        assert_eq!(caches.node_cache().len(), 0);

        node.set_id(3);
        caches.cache_node(&node);
        assert_eq!(caches.node_cache().get(&3), Some(node.clone()));
        assert_eq!(
            caches.uri_cache().get(&"http://example.org/a".to_string()).map(|n| n.id()),
            Some(3)
        );

        let mut lit = Node::string_literal("x", Some("en"), None);
        lit.set_id(4);
        caches.cache_node(&lit);
        let key = lit.literal_key().unwrap();
        assert_eq!(caches.literal_cache().get(&key).map(|n| n.id()), Some(4));
    }

    #[test]
    fn test_named_caches() {
        let caches = CacheManager::new(&CacheConfig::default());
        let a = caches.get_or_create::<String, i64>("a").unwrap();
        let again = caches.get_or_create::<String, i64>("a").unwrap();
        a.put("k".into(), 1);
        assert_eq!(again.get(&"k".to_string()), Some(1));

        let err = caches.get_or_create::<i64, i64>("a").err().unwrap();
        assert!(matches!(err, Error::Cache(_)));
        assert_eq!(caches.named_caches(), vec!["a".to_string()]);
    }

    #[test]
    fn test_clear_reaches_named_caches() {
        let caches = CacheManager::new(&CacheConfig::default());
        let named = caches.get_or_create::<u64, u64>("n").unwrap();
        named.put(1, 1);
        caches.namespace_prefix_cache().put("ex".into(), Namespace::new("ex", "http://ex/"));

        caches.clear();
        assert_eq!(named.get(&1), None);
        assert!(caches.namespace_prefix_cache().is_empty());

        caches.shutdown();
        assert!(caches.named_caches().is_empty());
    }

    #[test]
    fn test_disabled_backend() {
        let caches = CacheManager::new(&CacheConfig::disabled());
        let mut node = Node::bnode("b1");
        node.set_id(1);
        caches.cache_node(&node);
        assert_eq!(caches.bnode_cache().get(&"b1".to_string()), None);
    }
}
