//! Configuration for a KiWi store.
//!
//! A [`KiWiConfiguration`] names the database file, sizes the connection pool,
//! picks the triple registry strategy and sets the policy of every cache. It
//! can be built in code or loaded from a TOML document.
//!
//! # Examples
//!
//! ```
//! # use kiwi_store::{KiWiConfiguration, RegistryStrategy};
//! let mut config = KiWiConfiguration::sqlite("/tmp/kiwi.db");
//! config.registry = RegistryStrategy::Database;
//! assert!(config.validate().is_ok());
//!
//! let config = KiWiConfiguration::from_toml_str(r#"
//!     database_path = "/var/lib/kiwi/store.db"
//!     pool_size = 4
//!
//!     [cache.node]
//!     max_entries = 1000
//!     idle_seconds = 60
//! "#).unwrap();
//! assert_eq!(config.pool_size, 4);
//! assert_eq!(config.cache.node.max_entries, 1000);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Context assigned to statements added without one.
pub const DEFAULT_CONTEXT: &str = "http://localhost/context/default";
/// Context assigned to inferred statements added without one.
pub const INFERRED_CONTEXT: &str = "http://localhost/context/inferred";

/// Where the triple registry keeps its entries.
///
/// The strategies differ in how far the registry's view is shared: the local
/// registry lives inside the process, the cache registry inside the cache
/// backend, and the database registry in its own database file that several
/// store instances may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryStrategy {
    #[default]
    Local,
    Cache,
    Database,
}

/// Which cache backend fronts the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Bounded in-process caches.
    #[default]
    Local,
    /// No caching; every request goes to the database.
    Disabled,
}

/// Size bound and idle expiry of one cache. An `idle_seconds` of zero
/// disables idle expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub max_entries: u64,
    pub idle_seconds: u64,
}

impl CachePolicy {
    pub const fn new(max_entries: u64, idle_seconds: u64) -> Self {
        Self {
            max_entries,
            idle_seconds,
        }
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_seconds)
    }
}

/// Policies for the seven built-in caches and for named caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub node: CachePolicy,
    pub triple: CachePolicy,
    pub uri: CachePolicy,
    pub bnode: CachePolicy,
    pub literal: CachePolicy,
    pub namespace_uri: CachePolicy,
    pub namespace_prefix: CachePolicy,
    /// Policy of caches created through `CacheManager::get_or_create`.
    pub default_named: CachePolicy,
    /// Policy of the caches holding the cache-backed triple registry.
    pub registry: CachePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        const HALF_HOUR: u64 = 30 * 60;
        const HOUR: u64 = 60 * 60;
        Self {
            backend: CacheBackend::Local,
            node: CachePolicy::new(500_000, HALF_HOUR),
            triple: CachePolicy::new(100_000, HALF_HOUR),
            uri: CachePolicy::new(500_000, HALF_HOUR),
            bnode: CachePolicy::new(10_000, HALF_HOUR),
            literal: CachePolicy::new(100_000, HALF_HOUR),
            namespace_uri: CachePolicy::new(1_000, HOUR),
            namespace_prefix: CachePolicy::new(1_000, HOUR),
            default_named: CachePolicy::new(100_000, HALF_HOUR),
            registry: CachePolicy::new(1_000_000, 0),
        }
    }
}

impl CacheConfig {
    /// A configuration that caches nothing.
    pub fn disabled() -> Self {
        Self {
            backend: CacheBackend::Disabled,
            ..Self::default()
        }
    }
}

/// Query evaluation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Reorder patterns by estimated cardinality before compiling them.
    pub reorder_patterns: bool,
}

/// Complete configuration of a [`KiWiStore`](crate::KiWiStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KiWiConfiguration {
    /// SQLite database file holding nodes, triples and namespaces.
    pub database_path: PathBuf,
    /// Database file of the database-backed registry. Defaults to the
    /// store database path with a `.registry` suffix.
    pub registry_database_path: Option<PathBuf>,
    /// Maximum number of pooled connections.
    pub pool_size: u32,
    /// How long a writer waits for the database write lock.
    pub busy_timeout_ms: u64,
    pub default_context: String,
    pub inferred_context: String,
    pub registry: RegistryStrategy,
    pub cache: CacheConfig,
    pub query: QueryConfig,
}

impl Default for KiWiConfiguration {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("kiwi.db"),
            registry_database_path: None,
            pool_size: 8,
            busy_timeout_ms: 30_000,
            default_context: DEFAULT_CONTEXT.to_string(),
            inferred_context: INFERRED_CONTEXT.to_string(),
            registry: RegistryStrategy::default(),
            cache: CacheConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl KiWiConfiguration {
    /// Default configuration for the SQLite database at `path`.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }

    /// Parses a configuration from a TOML document. Missing keys take their
    /// default values.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The effective database path of the database-backed registry.
    pub fn registry_path(&self) -> PathBuf {
        self.registry_database_path.clone().unwrap_or_else(|| {
            let mut path = self.database_path.clone().into_os_string();
            path.push(".registry");
            PathBuf::from(path)
        })
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Checks the configuration for values the store cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("database_path must not be empty".into()));
        }
        if self.pool_size == 0 {
            return Err(Error::Config("pool_size must be at least 1".into()));
        }
        if self.default_context.is_empty() || self.inferred_context.is_empty() {
            return Err(Error::Config("context URIs must not be empty".into()));
        }
        if self.registry == RegistryStrategy::Cache && self.cache.backend == CacheBackend::Disabled {
            return Err(Error::Config(
                "the cache registry needs an enabled cache backend".into(),
            ));
        }
        if self.registry == RegistryStrategy::Database
            && self.registry_path() == self.database_path
        {
            return Err(Error::Config(
                "the registry database must differ from the store database".into(),
            ));
        }
        Ok(())
    }
}
