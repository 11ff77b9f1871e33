//! Relational persistence of nodes, triples and namespaces.
//!
//! The store keeps its data in one SQLite database accessed through an r2d2
//! connection pool. The database runs in WAL mode: readers never block and a
//! single writer at a time holds the write lock, waiting up to the
//! configured busy timeout to obtain it.

pub mod connection;
pub mod schema;
pub mod sequence;

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};
use std::sync::Arc;

use crate::caching::CacheManager;
use crate::config::KiWiConfiguration;
use crate::{Error, Result};

pub use connection::KiWiConnection;
pub use sequence::{Sequence, SequenceGenerator};

/// Pool, sequences and caches shared by all connections of a store.
pub struct KiWiPersistence {
    pool: Pool<SqliteConnectionManager>,
    sequences: SequenceGenerator,
    caches: Arc<CacheManager>,
    config: KiWiConfiguration,
}

impl KiWiPersistence {
    /// Opens or creates the database, creates the schema and loads the
    /// sequences.
    pub fn open(config: &KiWiConfiguration, caches: Arc<CacheManager>) -> Result<Self> {
        config.validate()?;

        let bootstrap = Connection::open(&config.database_path).map_err(|e| {
            Error::DataAccess(format!(
                "failed to open {}: {}",
                config.database_path.display(),
                e
            ))
        })?;
        bootstrap.busy_timeout(config.busy_timeout())?;
        bootstrap.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        bootstrap.execute_batch(schema::CREATE_SCHEMA)?;
        bootstrap.execute(
            "INSERT INTO metadata (mkey, mvalue) VALUES ('schema_version', ?1)
             ON CONFLICT(mkey) DO NOTHING",
            params![schema::SCHEMA_VERSION],
        )?;
        let sequences = SequenceGenerator::load(&bootstrap)?;
        drop(bootstrap);

        let busy_timeout = config.busy_timeout();
        let manager = SqliteConnectionManager::file(&config.database_path).with_init(move |c| {
            c.busy_timeout(busy_timeout)?;
            c.pragma_update(None, "synchronous", "NORMAL")?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(1))
            .build(manager)?;

        log::info!(
            "opened KiWi database {} (pool size {})",
            config.database_path.display(),
            config.pool_size
        );

        Ok(Self {
            pool,
            sequences,
            caches,
            config: config.clone(),
        })
    }

    /// Takes a connection from the pool and starts a new transaction on it.
    pub fn connection(self: &Arc<Self>) -> Result<KiWiConnection> {
        let conn = self.pool.get()?;
        let txn_id = self.sequences.next(Sequence::Transactions);
        Ok(KiWiConnection::new(Arc::clone(self), conn, txn_id))
    }

    pub fn sequences(&self) -> &SequenceGenerator {
        &self.sequences
    }

    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.caches
    }

    pub fn config(&self) -> &KiWiConfiguration {
        &self.config
    }

    /// Value of a key in the `metadata` table.
    pub fn metadata(&self, key: &str) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT mvalue FROM metadata WHERE mkey = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Writes the sequences back to the database.
    pub fn shutdown(&self) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        self.sequences.persist(&tx)?;
        tx.commit()?;
        log::info!("closed KiWi database {}", self.config.database_path.display());
        Ok(())
    }
}

/// Formats a timestamp for a `*_at` column.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::DataAccess(format!("malformed timestamp {:?}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn open(dir: &tempfile::TempDir) -> Arc<KiWiPersistence> {
        let config = KiWiConfiguration::sqlite(dir.path().join("kiwi.db"));
        let caches = Arc::new(CacheManager::new(&CacheConfig::default()));
        Arc::new(KiWiPersistence::open(&config, caches).unwrap())
    }

    #[test]
    fn test_open_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = open(&dir);
        assert_eq!(
            persistence.metadata("schema_version").unwrap().as_deref(),
            Some(schema::SCHEMA_VERSION)
        );
        assert_eq!(persistence.metadata("missing").unwrap(), None);
    }

    #[test]
    fn test_connections_get_distinct_transaction_ids() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = open(&dir);
        let a = persistence.connection().unwrap();
        let b = persistence.connection().unwrap();
        assert_ne!(a.transaction_id(), b.transaction_id());
    }

    #[test]
    fn test_shutdown_persists_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let last = {
            let persistence = open(&dir);
            let _ = persistence.connection().unwrap();
            let _ = persistence.connection().unwrap();
            persistence.shutdown().unwrap();
            persistence.sequences().current(Sequence::Transactions)
        };

        let persistence = open(&dir);
        assert_eq!(persistence.sequences().current(Sequence::Transactions), last);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        assert_eq!(parse_timestamp(&format_timestamp(&now)).unwrap(), now);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
