//! Id sequences.
//!
//! Ids are handed out from in-memory counters so that taking an id never
//! needs the database write lock. The counters are written back to the
//! `sequences` table by every mutating commit and at shutdown, and on open
//! each counter resumes from the larger of its stored value and the highest
//! id present in its table.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::Result;

/// The logical sequences of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    Nodes,
    Triples,
    Namespaces,
    Transactions,
}

impl Sequence {
    pub const ALL: [Sequence; 4] = [
        Sequence::Nodes,
        Sequence::Triples,
        Sequence::Namespaces,
        Sequence::Transactions,
    ];

    /// Row name in the `sequences` table.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nodes => "seq.nodes",
            Self::Triples => "seq.triples",
            Self::Namespaces => "seq.namespaces",
            Self::Transactions => "seq.transactions",
        }
    }

    /// The table whose ids this sequence issues.
    fn table(self) -> Option<&'static str> {
        match self {
            Self::Nodes => Some("nodes"),
            Self::Triples => Some("triples"),
            Self::Namespaces => Some("namespaces"),
            Self::Transactions => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Atomic counters for all sequences.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    counters: [AtomicI64; 4],
}

impl SequenceGenerator {
    /// Loads the counters from the database.
    pub fn load(conn: &Connection) -> Result<Self> {
        let generator = Self::default();
        for seq in Sequence::ALL {
            let stored: i64 = conn
                .query_row(
                    "SELECT value FROM sequences WHERE name = ?1",
                    params![seq.name()],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);
            let max_id: i64 = match seq.table() {
                Some(table) => conn.query_row(
                    &format!("SELECT IFNULL(MAX(id), 0) FROM {}", table),
                    [],
                    |row| row.get(0),
                )?,
                None => 0,
            };
            generator.counters[seq.index()].store(stored.max(max_id), Ordering::SeqCst);
        }
        Ok(generator)
    }

    /// Takes the next id of `seq`. Ids start at 1.
    pub fn next(&self, seq: Sequence) -> i64 {
        self.counters[seq.index()].fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The last id handed out by `seq`.
    pub fn current(&self, seq: Sequence) -> i64 {
        self.counters[seq.index()].load(Ordering::SeqCst)
    }

    /// Writes the counters to the `sequences` table. Stored values never
    /// decrease.
    pub fn persist(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO sequences (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = MAX(value, excluded.value)",
        )?;
        for seq in Sequence::ALL {
            stmt.execute(params![seq.name(), self.current(seq)])?;
        }
        Ok(())
    }
}
