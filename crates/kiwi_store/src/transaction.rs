//! Store transactions.

use std::mem;

use crate::namespace::Namespace;
use crate::node::Node;
use crate::persistence::KiWiConnection;
use crate::query::{self, CardinalityOptimizer, PatternOptimizer, PatternQuery, QueryResults};
use crate::store::{ChangeEvent, KiWiStore};
use crate::triple::Triple;
use crate::value_factory::LiteralValue;
use crate::{Error, Result};

/// A unit of work on a [`KiWiStore`], bound to one database connection.
///
/// A transaction belongs to one thread at a time. Reads see committed data
/// plus this transaction's own writes. The first write takes the database
/// write lock, which is held until [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). Dropping an unfinished transaction rolls it
/// back. After commit or rollback every method fails with
/// [`Error::TransactionClosed`].
pub struct KiWiTransaction {
    store: KiWiStore,
    conn: KiWiConnection,
    added: Vec<Triple>,
    removed: Vec<Triple>,
    closed: bool,
}

impl KiWiTransaction {
    pub(crate) fn new(store: KiWiStore, conn: KiWiConnection) -> Self {
        Self {
            store,
            conn,
            added: Vec::new(),
            removed: Vec::new(),
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::TransactionClosed)
        } else {
            Ok(())
        }
    }

    pub fn transaction_id(&self) -> i64 {
        self.conn.transaction_id()
    }

    pub fn is_active(&self) -> bool {
        !self.closed
    }

    pub fn store(&self) -> &KiWiStore {
        &self.store
    }

    pub fn create_uri(&mut self, uri: &str) -> Result<Node> {
        self.ensure_open()?;
        self.store.value_factory().create_uri(uri, &mut self.conn)
    }

    /// Returns the blank node with `label`, or a fresh one when `label` is
    /// `None`.
    pub fn create_bnode(&mut self, label: Option<&str>) -> Result<Node> {
        self.ensure_open()?;
        self.store.value_factory().create_bnode(label, &mut self.conn)
    }

    pub fn create_literal(&mut self, value: impl Into<LiteralValue>) -> Result<Node> {
        self.ensure_open()?;
        self.store.value_factory().create_literal(value, &mut self.conn)
    }

    pub fn create_string_literal(&mut self, content: &str, language: Option<&str>) -> Result<Node> {
        self.ensure_open()?;
        self.store
            .value_factory()
            .create_string_literal(content, language, &mut self.conn)
    }

    /// See [`KiWiValueFactory::create_typed_literal`](crate::KiWiValueFactory::create_typed_literal).
    pub fn create_typed_literal(&mut self, content: &str, datatype: &str) -> Result<Node> {
        self.ensure_open()?;
        self.store
            .value_factory()
            .create_typed_literal(content, datatype, &mut self.conn)
    }

    /// Returns the triple for a statement without storing it.
    pub fn create_statement(
        &mut self,
        subject: &Node,
        predicate: &Node,
        object: &Node,
        context: Option<&Node>,
    ) -> Result<Triple> {
        self.ensure_open()?;
        self.store
            .value_factory()
            .create_statement(subject, predicate, object, context, &mut self.conn)
    }

    /// Adds a statement. Without context it goes to the default context.
    ///
    /// Adding a statement that is already stored returns the stored triple
    /// and does not count as a change.
    pub fn add_statement(
        &mut self,
        subject: &Node,
        predicate: &Node,
        object: &Node,
        context: Option<&Node>,
    ) -> Result<Triple> {
        self.ensure_open()?;
        let triple = self
            .store
            .value_factory()
            .create_statement(subject, predicate, object, context, &mut self.conn)?;
        self.store_statement(triple)
    }

    /// Adds a statement derived by reasoning. Without context it goes to the
    /// inferred context.
    pub fn add_inferred_statement(
        &mut self,
        subject: &Node,
        predicate: &Node,
        object: &Node,
        context: Option<&Node>,
    ) -> Result<Triple> {
        self.ensure_open()?;
        let context = match context {
            Some(ctx) => ctx.clone(),
            None => {
                let uri = self.store.config().inferred_context.clone();
                self.store.value_factory().create_uri(&uri, &mut self.conn)?
            }
        };
        let mut triple = self.store.value_factory().create_statement(
            subject,
            predicate,
            object,
            Some(&context),
            &mut self.conn,
        )?;
        // a row that already exists keeps its stored flag
        triple.inferred = true;
        self.store_statement(triple)
    }

    fn store_statement(&mut self, mut triple: Triple) -> Result<Triple> {
        if self.conn.store_triple(&mut triple)? {
            self.added.push(triple.clone());
        }
        Ok(triple)
    }

    /// Removes the statements matching the given slots, inferred ones
    /// included. `None` matches anything. Returns the number removed.
    pub fn remove_statements(
        &mut self,
        subject: Option<&Node>,
        predicate: Option<&Node>,
        object: Option<&Node>,
        context: Option<&Node>,
    ) -> Result<usize> {
        self.ensure_open()?;
        let matching = self
            .conn
            .list_triples(subject, predicate, object, context, true)?;
        let mut count = 0;
        for mut triple in matching {
            if !self
                .store
                .value_factory()
                .remove_statement(&mut triple, &mut self.conn)?
            {
                continue;
            }
            count += 1;
            // a triple added and removed here never reaches the listeners
            match self.added.iter().position(|t| t.id() == triple.id()) {
                Some(pos) => {
                    self.added.remove(pos);
                }
                None => self.removed.push(triple),
            }
        }
        Ok(count)
    }

    /// Lists the statements matching the given slots.
    pub fn get_statements(
        &mut self,
        subject: Option<&Node>,
        predicate: Option<&Node>,
        object: Option<&Node>,
        context: Option<&Node>,
        include_inferred: bool,
    ) -> Result<Vec<Triple>> {
        self.ensure_open()?;
        self.conn
            .list_triples(subject, predicate, object, context, include_inferred)
    }

    /// Returns `true` if a statement matches the given slots. Database
    /// errors are logged and answered with `false`.
    pub fn contains(
        &mut self,
        subject: Option<&Node>,
        predicate: Option<&Node>,
        object: Option<&Node>,
        context: Option<&Node>,
    ) -> Result<bool> {
        self.ensure_open()?;
        match self
            .conn
            .list_triples(subject, predicate, object, context, true)
        {
            Ok(triples) => Ok(!triples.is_empty()),
            Err(e) if e.is_data_access() => {
                log::warn!("existence check failed: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Number of statements, in one context or overall.
    pub fn size(&mut self, context: Option<&Node>) -> Result<i64> {
        self.ensure_open()?;
        self.conn.count_triples(context)
    }

    /// Contexts holding at least one statement.
    pub fn contexts(&mut self) -> Result<Vec<Node>> {
        self.ensure_open()?;
        self.conn.list_contexts()
    }

    /// Evaluates a pattern query. The results borrow the transaction until
    /// they are dropped or closed.
    pub fn query(&mut self, query: &PatternQuery) -> Result<QueryResults<'_>> {
        self.ensure_open()?;
        let reorder = self.store.config().query.reorder_patterns;
        let optimizer: Option<&dyn PatternOptimizer> = if reorder {
            Some(&CardinalityOptimizer)
        } else {
            None
        };
        query::evaluate(query, &mut self.conn, optimizer)
    }

    pub fn get_namespace(&mut self, prefix: &str) -> Result<Option<Namespace>> {
        self.ensure_open()?;
        self.conn.load_namespace_by_prefix(prefix)
    }

    pub fn get_namespace_by_uri(&mut self, uri: &str) -> Result<Option<Namespace>> {
        self.ensure_open()?;
        self.conn.load_namespace_by_uri(uri)
    }

    /// Binds `prefix` to `uri`, replacing earlier bindings of either.
    pub fn set_namespace(&mut self, prefix: &str, uri: &str) -> Result<Namespace> {
        self.ensure_open()?;
        if let Some(existing) = self.conn.load_namespace_by_prefix(prefix)? {
            if existing.uri == uri {
                return Ok(existing);
            }
            self.conn.delete_namespace(&existing)?;
        }
        if let Some(existing) = self.conn.load_namespace_by_uri(uri)? {
            self.conn.delete_namespace(&existing)?;
        }
        let mut ns = Namespace::new(prefix, uri);
        self.conn.store_namespace(&mut ns)?;
        Ok(ns)
    }

    /// Removes the binding of `prefix`. Returns `false` if there was none.
    pub fn remove_namespace(&mut self, prefix: &str) -> Result<bool> {
        self.ensure_open()?;
        match self.conn.load_namespace_by_prefix(prefix)? {
            Some(ns) => self.conn.delete_namespace(&ns),
            None => Ok(false),
        }
    }

    pub fn namespaces(&mut self) -> Result<Vec<Namespace>> {
        self.ensure_open()?;
        self.conn.list_namespaces()
    }

    /// Commits the transaction.
    ///
    /// The registry entries of this transaction are released whether or not
    /// the database commit succeeds. Listeners are called once if the
    /// transaction added or removed statements.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;

        let flushed = self.conn.commit();
        let released = self.store.value_factory().release_registry(&self.conn);
        match flushed {
            Ok(()) => {
                self.conn.publish_in_flight();
                let event = ChangeEvent {
                    added: mem::take(&mut self.added),
                    removed: mem::take(&mut self.removed),
                };
                log::debug!(
                    "committed transaction {}: {} added, {} removed",
                    self.conn.transaction_id(),
                    event.added.len(),
                    event.removed.len()
                );
                if !event.is_empty() {
                    self.store.notify(&event);
                }
                released
            }
            Err(e) => {
                self.conn.discard_in_flight();
                self.added.clear();
                self.removed.clear();
                if let Err(r) = released {
                    log::warn!("registry release after failed commit: {}", r);
                }
                Err(e)
            }
        }
    }

    /// Discards everything this transaction wrote. Listeners are not called.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.abort()
    }

    fn abort(&mut self) -> Result<()> {
        let rolled_back = self.conn.rollback();
        let released = self.store.value_factory().release_registry(&self.conn);
        self.conn.discard_in_flight();
        self.added.clear();
        self.removed.clear();
        rolled_back.and(released)
    }
}

impl Drop for KiWiTransaction {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.conn.has_changes() {
            log::warn!(
                "transaction {} dropped while active, rolling back",
                self.conn.transaction_id()
            );
        }
        if let Err(e) = self.abort() {
            log::warn!("rollback of transaction {} failed: {}", self.conn.transaction_id(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KiWiConfiguration;
    use crate::namespace::vocab;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn setup() -> (TempDir, KiWiStore) {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let store = KiWiStore::open(KiWiConfiguration::sqlite(dir.path().join("txn.db"))).unwrap();
        (dir, store)
    }

    #[test]
    fn test_add_twice_in_one_transaction() {
        let (_dir, store) = setup();
        let mut txn = store.begin().unwrap();
        let s = txn.create_uri("http://example.org/s").unwrap();
        let p = txn.create_uri("http://example.org/p").unwrap();
        let o = txn.create_string_literal("o", Some("en")).unwrap();

        let first = txn.add_statement(&s, &p, &o, None).unwrap();
        let second = txn.add_statement(&s, &p, &o, None).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(txn.size(None).unwrap(), 1);
        assert_eq!(
            first.context().and_then(Node::as_uri),
            Some(store.config().default_context.as_str())
        );
        txn.commit().unwrap();
    }

    #[test]
    fn test_closed_transaction() {
        let (_dir, store) = setup();
        let mut txn = store.begin().unwrap();
        txn.commit().unwrap();
        assert!(!txn.is_active());
        assert!(matches!(txn.create_uri("http://x"), Err(Error::TransactionClosed)));
        assert!(matches!(txn.commit(), Err(Error::TransactionClosed)));
        assert!(matches!(txn.rollback(), Err(Error::TransactionClosed)));
    }

    #[test]
    fn test_inferred_statements() {
        let (_dir, store) = setup();
        let mut txn = store.begin().unwrap();
        let s = txn.create_uri("http://example.org/s").unwrap();
        let p = txn.create_uri(vocab::RDF_TYPE).unwrap();
        let o = txn.create_uri("http://example.org/C").unwrap();

        let t = txn.add_inferred_statement(&s, &p, &o, None).unwrap();
        assert!(t.is_inferred());
        assert_eq!(
            t.context().and_then(Node::as_uri),
            Some(store.config().inferred_context.as_str())
        );
        assert!(txn.get_statements(Some(&s), None, None, None, false).unwrap().is_empty());
        assert_eq!(txn.get_statements(Some(&s), None, None, None, true).unwrap().len(), 1);

        assert_eq!(txn.remove_statements(Some(&s), None, None, None).unwrap(), 1);
        assert!(!txn.contains(Some(&s), None, None, None).unwrap());
        txn.commit().unwrap();
    }

    #[test]
    fn test_inferred_flag_on_adopted_id() {
        let (_dir, store) = setup();
        let mut setup_txn = store.begin().unwrap();
        let s = setup_txn.create_uri("http://example.org/s").unwrap();
        let p = setup_txn.create_uri(vocab::RDF_TYPE).unwrap();
        let o = setup_txn.create_uri("http://example.org/C").unwrap();
        let inferred = setup_txn
            .create_uri(&store.config().inferred_context)
            .unwrap();
        setup_txn.commit().unwrap();

        // t1 hands out the id without storing the row
        let mut t1 = store.begin().unwrap();
        let pending = t1.create_statement(&s, &p, &o, Some(&inferred)).unwrap();
        assert!(pending.is_new());

        let mut t2 = store.begin().unwrap();
        let t = t2.add_inferred_statement(&s, &p, &o, None).unwrap();
        assert_eq!(t.id(), pending.id());
        assert!(!t.is_new());
        assert!(t.is_inferred());
        t2.commit().unwrap();
        t1.rollback().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(txn.get_statements(Some(&s), None, None, None, false).unwrap().is_empty());
        let stored = txn.get_statements(Some(&s), None, None, None, true).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_inferred());
        txn.commit().unwrap();
    }

    #[test]
    fn test_commit_and_rollback_notifications() {
        let (_dir, store) = setup();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.add_change_listener(move |e| sink.lock().unwrap().push(e.clone()));

        let mut txn = store.begin().unwrap();
        let s = txn.create_uri("http://example.org/s").unwrap();
        let p = txn.create_uri("http://example.org/p").unwrap();
        txn.add_statement(&s, &p, &s, None).unwrap();
        txn.rollback().unwrap();
        assert!(events.lock().unwrap().is_empty());

        let mut txn = store.begin().unwrap();
        let s = txn.create_uri("http://example.org/s").unwrap();
        let p = txn.create_uri("http://example.org/p").unwrap();
        let o = txn.create_literal(true).unwrap();
        txn.add_statement(&s, &p, &s, None).unwrap();
        txn.add_statement(&s, &p, &o, None).unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert_eq!(txn.size(None).unwrap(), 2);
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert_eq!(txn.remove_statements(None, None, Some(&o), None).unwrap(), 1);
        txn.commit().unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].added.len(), 2);
        assert!(events[0].removed.is_empty());
        assert_eq!(events[1].removed.len(), 1);
    }

    #[test]
    fn test_add_then_remove_is_no_change() {
        let (_dir, store) = setup();
        let notified = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&notified);
        store.add_change_listener(move |_| *sink.lock().unwrap() += 1);

        let mut txn = store.begin().unwrap();
        let s = txn.create_uri("http://example.org/s").unwrap();
        let p = txn.create_uri("http://example.org/p").unwrap();
        txn.add_statement(&s, &p, &s, None).unwrap();
        assert_eq!(txn.remove_statements(Some(&s), None, None, None).unwrap(), 1);
        txn.commit().unwrap();
        assert_eq!(*notified.lock().unwrap(), 0);
    }

    #[test]
    fn test_drop_rolls_back() {
        let (_dir, store) = setup();
        {
            let mut txn = store.begin().unwrap();
            let s = txn.create_uri("http://example.org/s").unwrap();
            let p = txn.create_uri("http://example.org/p").unwrap();
            txn.add_statement(&s, &p, &s, None).unwrap();
        }
        let mut txn = store.begin().unwrap();
        assert_eq!(txn.size(None).unwrap(), 0);
        assert!(txn.contexts().unwrap().is_empty());
        txn.commit().unwrap();
    }

    #[test]
    fn test_namespaces() {
        let (_dir, store) = setup();
        let mut txn = store.begin().unwrap();
        txn.set_namespace("ex", "http://example.org/").unwrap();
        txn.set_namespace("foaf", "http://xmlns.com/foaf/0.1/").unwrap();
        // rebinding the uri drops the old prefix
        txn.set_namespace("e", "http://example.org/").unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(txn.get_namespace("ex").unwrap().is_none());
        assert_eq!(
            txn.get_namespace_by_uri("http://example.org/").unwrap().map(|n| n.prefix),
            Some("e".to_string())
        );
        assert!(txn.remove_namespace("foaf").unwrap());
        assert!(!txn.remove_namespace("foaf").unwrap());
        let prefixes: Vec<_> = txn.namespaces().unwrap().into_iter().map(|n| n.prefix).collect();
        assert_eq!(prefixes, vec!["e"]);
        txn.commit().unwrap();
    }
}
