//! KiWi - persistent RDF triple store on a relational backend
//!
//! KiWi stores RDF nodes and quads (subject, predicate, object, context) in
//! a SQLite database. Every node and triple gets a numeric surrogate id; the
//! natural key of a node (its URI, blank node label, or lexical form with
//! language and datatype) maps to exactly one id, and a statement maps to at
//! most one non-deleted triple row.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        KiWiStore                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                 KiWiTransaction                       │   │
//! │  │  Statements │ Pattern queries │ Namespaces           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌────────────────────┐  ┌────────────────────────────┐     │
//! │  │   Value Factory    │──│      Triple Registry       │     │
//! │  │ cache → db → mint  │  │  Local │ Cache │ Database  │     │
//! │  └────────────────────┘  └────────────────────────────┘     │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                  Cache Manager                        │   │
//! │  │  nodes │ triples │ uris │ bnodes │ literals │ named  │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                   Persistence                         │   │
//! │  │  r2d2 pool │ SQLite (WAL) │ sequences │ soft delete  │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use kiwi_store::query::{Pattern, PatternQuery, PatternTerm};
//! use kiwi_store::{KiWiConfiguration, KiWiStore};
//!
//! let store = KiWiStore::open(KiWiConfiguration::sqlite("kiwi.db"))?;
//!
//! let mut txn = store.begin()?;
//! let alice = txn.create_uri("http://example.org/alice")?;
//! let knows = txn.create_uri("http://xmlns.com/foaf/0.1/knows")?;
//! let bob = txn.create_uri("http://example.org/bob")?;
//! txn.add_statement(&alice, &knows, &bob, None)?;
//! txn.commit()?;
//!
//! let mut txn = store.begin()?;
//! let query = PatternQuery::new(vec![Pattern::new(
//!     PatternTerm::var("x"),
//!     knows.clone(),
//!     PatternTerm::var("y"),
//! )]);
//! for row in txn.query(&query)? {
//!     let row = row?;
//!     println!("{} knows {}", row["x"], row["y"]);
//! }
//! txn.commit()?;
//! # Ok::<(), kiwi_store::Error>(())
//! ```
//!
//! # Concurrency
//!
//! A [`KiWiStore`] is shared between threads by cloning it. Each thread
//! opens its own [`KiWiTransaction`]. Statements created by transactions
//! that have not committed yet are tracked in the [`TripleRegistry`], so
//! two transactions adding the same statement end up with one triple id.

pub mod caching;
pub mod config;
pub mod error;
pub mod namespace;
pub mod node;
pub mod persistence;
pub mod query;
pub mod registry;
pub mod store;
pub mod transaction;
pub mod triple;
pub mod value_factory;

// Re-exports
pub use caching::{CacheManager, KiWiCache, LocalCache, PassThroughCache, SharedCache};
pub use config::{
    CacheBackend, CacheConfig, CachePolicy, KiWiConfiguration, QueryConfig, RegistryStrategy,
};
pub use error::{Error, Result};
pub use namespace::{vocab, Namespace};
pub use node::{LiteralKey, NaturalKey, Node, NodeKind, UriResource};
pub use query::{BindingSet, Filter, Pattern, PatternQuery, PatternTerm, QueryResults};
pub use registry::{RegistryEntry, RegistryKey, TripleRegistry};
pub use store::{ChangeEvent, ChangeListener, KiWiStore};
pub use transaction::KiWiTransaction;
pub use triple::Triple;
pub use value_factory::{KiWiValueFactory, LiteralValue};
