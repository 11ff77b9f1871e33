//! Triple registry kept in its own SQLite database.
//!
//! The registry database is separate from the store database so registry
//! writes are autocommitted immediately and never wait for the write lock an
//! open store transaction holds. Several store instances pointing at the same
//! registry file share one view of in-flight triples.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use super::{RegistryKey, TripleRegistry};
use crate::{Error, Result};

/// Database-backed triple registry.
pub struct DatabaseTripleRegistry {
    conn: Mutex<Connection>,
}

impl DatabaseTripleRegistry {
    /// Open or create the registry database at the given path.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| Error::Registry(format!("failed to open registry db: {}", e)))?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;

        let registry = Self {
            conn: Mutex::new(conn),
        };
        registry.init_schema()?;
        Ok(registry)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS registry (
                subject   INTEGER NOT NULL,
                predicate INTEGER NOT NULL,
                object    INTEGER NOT NULL,
                context   INTEGER NOT NULL,
                txn_id    INTEGER NOT NULL,
                triple_id INTEGER NOT NULL,
                PRIMARY KEY (subject, predicate, object, context, txn_id)
            );
            CREATE INDEX IF NOT EXISTS idx_registry_txn ON registry(txn_id);",
        )
        .map_err(|e| Error::Registry(format!("failed to create table: {}", e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Registry("lock poisoned".into()))
    }
}

impl TripleRegistry for DatabaseTripleRegistry {
    fn lookup_key(&self, key: &RegistryKey) -> Result<Option<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT triple_id FROM registry
             WHERE subject = ?1 AND predicate = ?2 AND object = ?3 AND context = ?4
             LIMIT 1",
        )?;
        let id = stmt
            .query_row(
                params![key.subject, key.predicate, key.object, key.context],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Registry(format!("registry lookup failed: {}", e)))?;
        Ok(id)
    }

    fn register_key(&self, key: RegistryKey, txn_id: i64, triple_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.prepare_cached(
            "INSERT OR REPLACE INTO registry
                (subject, predicate, object, context, txn_id, triple_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![
            key.subject,
            key.predicate,
            key.object,
            key.context,
            txn_id,
            triple_id
        ])
        .map_err(|e| Error::Registry(format!("registry insert failed: {}", e)))?;
        Ok(())
    }

    fn delete_key(&self, key: &RegistryKey) -> Result<()> {
        let conn = self.lock()?;
        conn.prepare_cached(
            "DELETE FROM registry
             WHERE subject = ?1 AND predicate = ?2 AND object = ?3 AND context = ?4",
        )?
        .execute(params![key.subject, key.predicate, key.object, key.context])
        .map_err(|e| Error::Registry(format!("registry delete failed: {}", e)))?;
        Ok(())
    }

    fn release_transaction(&self, txn_id: i64) -> Result<()> {
        let conn = self.lock()?;
        let released = conn
            .prepare_cached("DELETE FROM registry WHERE txn_id = ?1")?
            .execute(params![txn_id])
            .map_err(|e| Error::Registry(format!("registry release failed: {}", e)))?;
        log::debug!("released {} registry entries of transaction {}", released, txn_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "database"
    }
}
