//! Error types for the KiWi triple store.
//!
//! This module provides a unified `Error` type for all store operations.

use thiserror::Error;

/// A specialized `Result` type for triple store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Defines the errors that can occur while building terms, storing
/// statements or evaluating pattern queries.
#[derive(Error, Debug)]
pub enum Error {
    /// A failure of the relational backend (connection loss, constraint
    /// violation, malformed SQL, exhausted pool).
    #[error("data access error: {0}")]
    DataAccess(String),

    /// A statement whose slots hold the wrong kind of node.
    #[error("invalid triple: {0}")]
    InvalidTriple(String),

    /// A malformed pattern query request.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A filter expression the pattern compiler cannot translate.
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// A failure of the triple registry backend.
    #[error("registry error: {0}")]
    Registry(String),

    /// An error related to the store configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A named cache was requested with types different from the ones it was
    /// created with.
    #[error("cache error: {0}")]
    Cache(String),

    /// The transaction was already committed or rolled back.
    #[error("transaction already closed")]
    TransactionClosed,

    /// An error from the underlying I/O system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for failures of the relational backend, which callers
    /// may retry in a fresh transaction.
    pub fn is_data_access(&self) -> bool {
        matches!(self, Self::DataAccess(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::DataAccess(err.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Self::DataAccess(format!("connection pool: {}", err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
