//! Pattern queries over the triple table.
//!
//! A [`PatternQuery`] is a conjunction of quad patterns whose slots hold
//! either fixed nodes or named variables. The compiler turns it into one SQL
//! statement with a `triples` entry per pattern and a `nodes` join per
//! variable occurrence, runs it on the transaction's connection and yields
//! one [`BindingSet`] per result row.
//!
//! # Examples
//!
//! ```no_run
//! use kiwi_store::query::{Pattern, PatternQuery, PatternTerm};
//! use kiwi_store::{KiWiConfiguration, KiWiStore, Node};
//!
//! # fn main() -> kiwi_store::Result<()> {
//! let store = KiWiStore::open(KiWiConfiguration::sqlite("people.db"))?;
//! let mut txn = store.begin()?;
//!
//! let query = PatternQuery::new(vec![
//!     Pattern::new(
//!         PatternTerm::var("x"),
//!         Node::uri("http://www.w3.org/1999/02/22-rdf-syntax-ns#type"),
//!         Node::uri("http://example.org/Person"),
//!     ),
//!     Pattern::new(
//!         PatternTerm::var("x"),
//!         Node::uri("http://example.org/age"),
//!         PatternTerm::var("age"),
//!     ),
//! ])
//! .order_by("age");
//!
//! for row in txn.query(&query)? {
//!     let row = row?;
//!     println!("{} is {}", row["x"], row["age"]);
//! }
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod optimizer;
pub mod sql;

use indexmap::IndexMap;
use std::collections::HashMap;
use std::ops::Index;

use crate::node::Node;
use crate::persistence::KiWiConnection;
use crate::triple::Triple;
use crate::Result;

pub use compiler::{CompiledQuery, ResolvedPattern, ResolvedQuery, Slot};
pub use optimizer::{CardinalityOptimizer, PatternOptimizer};
pub use sql::{SelectQuery, SqlDialect, SqliteDialect};

/// A slot of a pattern: a fixed node or a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternTerm {
    Value(Node),
    Variable(String),
}

impl PatternTerm {
    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Self::Variable(name) => Some(name),
            Self::Value(_) => None,
        }
    }
}

impl From<Node> for PatternTerm {
    fn from(node: Node) -> Self {
        Self::Value(node)
    }
}

/// A quad pattern. A pattern without context matches any context.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub subject: PatternTerm,
    pub predicate: PatternTerm,
    pub object: PatternTerm,
    pub context: Option<PatternTerm>,
}

impl Pattern {
    pub fn new(
        subject: impl Into<PatternTerm>,
        predicate: impl Into<PatternTerm>,
        object: impl Into<PatternTerm>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            context: None,
        }
    }

    pub fn in_context(mut self, context: impl Into<PatternTerm>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The slots in subject, predicate, object, context order.
    pub fn terms(&self) -> impl Iterator<Item = &PatternTerm> {
        [Some(&self.subject), Some(&self.predicate), Some(&self.object), self.context.as_ref()]
            .into_iter()
            .flatten()
    }
}

/// A filter on the rows of a pattern query.
///
/// Only term equality compiles to SQL; the other filters are rejected with
/// `Error::UnsupportedFilter` before anything runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Both variables are bound to the same node.
    SameTerm(String, String),
    /// The variable is bound to the given node.
    SameValue(String, Node),
    /// The lexical form of the variable's value matches a regular expression.
    Regex(String, String),
    /// The variable's value compares to the node with the operator.
    Compare(String, CompareOp, Node),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
}

/// A conjunctive pattern query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternQuery {
    pub patterns: Vec<Pattern>,
    /// Values fixed for variables before evaluation. Bindings of variables
    /// that no pattern mentions are copied into every result row.
    pub bindings: HashMap<String, Node>,
    pub order_by: Vec<String>,
    /// Attach the matched triples to every result row.
    pub justifications: bool,
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
}

impl PatternQuery {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self {
            patterns,
            ..Default::default()
        }
    }

    pub fn bind(mut self, variable: impl Into<String>, value: Node) -> Self {
        self.bindings.insert(variable.into(), value);
        self
    }

    pub fn order_by(mut self, variable: impl Into<String>) -> Self {
        self.order_by.push(variable.into());
        self
    }

    pub fn with_justifications(mut self) -> Self {
        self.justifications = true;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One result row: variable bindings in first-occurrence order, plus the
/// matched triples when justifications were requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingSet {
    bindings: IndexMap<String, Node>,
    justifications: Vec<Triple>,
}

impl BindingSet {
    pub fn get(&self, variable: &str) -> Option<&Node> {
        self.bindings.get(variable)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// The triples that produced this row, one per pattern, in the order the
    /// patterns were given to the query.
    pub fn justifications(&self) -> &[Triple] {
        &self.justifications
    }
}

impl Index<&str> for BindingSet {
    type Output = Node;

    /// # Panics
    ///
    /// Panics if the variable is not bound.
    fn index(&self, variable: &str) -> &Node {
        &self.bindings[variable]
    }
}

/// Rows of an evaluated pattern query.
///
/// The SQL cursor is already closed when this iterator is handed out; rows
/// hold node ids that are resolved to nodes (cache first, then database)
/// as the iterator advances.
pub struct QueryResults<'c> {
    conn: Option<&'c mut KiWiConnection>,
    rows: std::vec::IntoIter<Vec<i64>>,
    variables: Vec<String>,
    extra: Vec<(String, Node)>,
}

impl<'c> QueryResults<'c> {
    pub(crate) fn new(
        conn: &'c mut KiWiConnection,
        rows: Vec<Vec<i64>>,
        variables: Vec<String>,
        extra: Vec<(String, Node)>,
    ) -> Self {
        Self {
            conn: Some(conn),
            rows: rows.into_iter(),
            variables,
            extra,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            conn: None,
            rows: Vec::new().into_iter(),
            variables: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Variables of the result rows in projection order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Number of rows not yet returned.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Drops the remaining rows and releases the connection borrow.
    pub fn close(&mut self) {
        self.rows = Vec::new().into_iter();
        self.conn = None;
    }

    fn materialize(
        conn: &mut KiWiConnection,
        variables: &[String],
        extra: &[(String, Node)],
        row: Vec<i64>,
    ) -> Result<BindingSet> {
        let mut set = BindingSet::default();
        let (var_ids, triple_ids) = row.split_at(variables.len().min(row.len()));
        for (name, &id) in variables.iter().zip(var_ids) {
            let node = conn.resolve_node(id)?.ok_or_else(|| {
                crate::Error::DataAccess(format!("query returned unknown node {}", id))
            })?;
            set.bindings.insert(name.clone(), node);
        }
        for (name, node) in extra {
            set.bindings.insert(name.clone(), node.clone());
        }
        for &id in triple_ids {
            if let Some(triple) = conn.load_triple_by_id(id)? {
                set.justifications.push(triple);
            }
        }
        Ok(set)
    }
}

impl Iterator for QueryResults<'_> {
    type Item = Result<BindingSet>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        let conn = self.conn.as_deref_mut()?;
        let result = Self::materialize(conn, &self.variables, &self.extra, row);
        if self.rows.len() == 0 {
            self.conn = None;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.rows.len()))
    }
}

/// Evaluates a pattern query on a connection.
///
/// # Errors
///
/// - `Error::InvalidQuery` for an empty pattern set or a reference to a
///   variable no pattern mentions
/// - `Error::UnsupportedFilter` for filters other than term equality
/// - `Error::DataAccess` if the statement fails
pub fn evaluate<'c>(
    query: &PatternQuery,
    conn: &'c mut KiWiConnection,
    optimizer: Option<&dyn PatternOptimizer>,
) -> Result<QueryResults<'c>> {
    compiler::validate(query)?;

    let Some(mut resolved) = compiler::resolve(query, conn)? else {
        log::debug!("pattern query references unknown nodes, no rows");
        return Ok(QueryResults::empty());
    };
    if let Some(optimizer) = optimizer {
        resolved.patterns = optimizer.optimize(std::mem::take(&mut resolved.patterns), conn);
    }

    let compiled = compiler::compile(&resolved);
    let (sql, params) = SqliteDialect.render(&compiled.select);
    log::debug!("pattern query:\n{}\nparams: {:?}", sql, params);

    let width = compiled.variables.len() + compiled.justifications;
    let rows = {
        let mut stmt = conn.sqlite().prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            (0..width).map(|i| row.get::<_, i64>(i)).collect::<rusqlite::Result<Vec<_>>>()
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    Ok(QueryResults::new(conn, rows, compiled.variables, resolved.extra_bindings))
}
