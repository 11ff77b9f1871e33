//! Per-transaction database connection.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::sync::Arc;

use super::schema::{NODE_COLUMNS, TRIPLE_COLUMNS};
use super::sequence::Sequence;
use super::{format_timestamp, parse_timestamp, KiWiPersistence};
use crate::namespace::Namespace;
use crate::node::{Node, NodeKind};
use crate::triple::Triple;
use crate::{Error, Result};

/// A node row before its datatype reference is resolved.
struct NodeRow {
    id: i64,
    ntype: String,
    svalue: String,
    ivalue: Option<i64>,
    dvalue: Option<f64>,
    tvalue: Option<String>,
    tzoffset: Option<i32>,
    bvalue: Option<bool>,
    ltype: Option<i64>,
    lang: Option<String>,
    created_at: String,
}

impl NodeRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ntype: row.get(1)?,
            svalue: row.get(2)?,
            ivalue: row.get(3)?,
            dvalue: row.get(4)?,
            tvalue: row.get(5)?,
            tzoffset: row.get(6)?,
            bvalue: row.get(7)?,
            ltype: row.get(8)?,
            lang: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

struct TripleRow {
    id: i64,
    subject: i64,
    predicate: i64,
    object: i64,
    context: i64,
    creator: Option<i64>,
    inferred: bool,
    deleted: bool,
    created_at: String,
    deleted_at: Option<String>,
}

impl TripleRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            predicate: row.get(2)?,
            object: row.get(3)?,
            context: row.get(4)?,
            creator: row.get(5)?,
            inferred: row.get(6)?,
            deleted: row.get(7)?,
            created_at: row.get(8)?,
            deleted_at: row.get(9)?,
        })
    }
}

/// One database connection bound to one store transaction.
///
/// Reads run in autocommit mode and see the latest committed state until the
/// first write, which opens a write transaction (`BEGIN IMMEDIATE`) holding
/// the database write lock until [`commit`](Self::commit) or
/// [`rollback`](Self::rollback).
///
/// Nodes and triples this connection writes, or reads while its write
/// transaction is open, are kept in an in-flight list. They reach the shared
/// caches only through [`publish_in_flight`](Self::publish_in_flight) after a
/// successful commit, so other transactions never see cached entries of
/// uncommitted rows.
pub struct KiWiConnection {
    persistence: Arc<KiWiPersistence>,
    conn: PooledConnection<SqliteConnectionManager>,
    transaction_id: i64,
    in_write: bool,
    in_flight_nodes: Vec<Node>,
    in_flight_triples: Vec<Triple>,
    in_flight_namespaces: Vec<Namespace>,
    removed_namespaces: Vec<Namespace>,
    touched_triples: Vec<i64>,
}

impl KiWiConnection {
    pub(crate) fn new(
        persistence: Arc<KiWiPersistence>,
        conn: PooledConnection<SqliteConnectionManager>,
        transaction_id: i64,
    ) -> Self {
        Self {
            persistence,
            conn,
            transaction_id,
            in_write: false,
            in_flight_nodes: Vec::new(),
            in_flight_triples: Vec::new(),
            in_flight_namespaces: Vec::new(),
            removed_namespaces: Vec::new(),
            touched_triples: Vec::new(),
        }
    }

    /// Id of the transaction this connection belongs to.
    pub fn transaction_id(&self) -> i64 {
        self.transaction_id
    }

    /// Returns `true` once this connection has written to the database.
    pub fn has_changes(&self) -> bool {
        self.in_write
    }

    pub fn persistence(&self) -> &Arc<KiWiPersistence> {
        &self.persistence
    }

    pub(crate) fn sqlite(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn begin_write(&mut self) -> Result<()> {
        if !self.in_write {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.in_write = true;
            log::debug!("transaction {} took the write lock", self.transaction_id);
        }
        Ok(())
    }

    /// Commits the write transaction, if any. Sequences are persisted in the
    /// same transaction. On failure the write transaction is rolled back.
    pub fn commit(&mut self) -> Result<()> {
        if !self.in_write {
            return Ok(());
        }
        let result = self
            .persistence
            .sequences()
            .persist(&self.conn)
            .and_then(|_| Ok(self.conn.execute_batch("COMMIT")?));
        if result.is_err() {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
        self.in_write = false;
        result
    }

    /// Rolls back the write transaction, if any.
    pub fn rollback(&mut self) -> Result<()> {
        if !self.in_write {
            return Ok(());
        }
        self.in_write = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// Caches a node, or keeps it in flight while a write transaction is
    /// open.
    pub fn cache_node(&mut self, node: &Node) {
        if !node.is_persisted() {
            return;
        }
        if self.in_write {
            self.in_flight_nodes.push(node.clone());
        } else {
            self.persistence.caches().cache_node(node);
        }
    }

    fn cache_triple(&mut self, triple: &Triple) {
        if self.in_write {
            self.in_flight_triples.push(triple.clone());
        } else {
            self.persistence.caches().cache_triple(triple);
        }
    }

    /// Moves in-flight entries into the shared caches. Call after a
    /// successful commit.
    pub fn publish_in_flight(&mut self) {
        let caches = Arc::clone(self.persistence.caches());
        for id in self.touched_triples.drain(..) {
            caches.triple_cache().remove(&id);
        }
        for node in self.in_flight_nodes.drain(..) {
            caches.cache_node(&node);
        }
        for triple in self.in_flight_triples.drain(..) {
            if !triple.is_deleted() {
                caches.cache_triple(&triple);
            }
        }
        for ns in self.removed_namespaces.drain(..) {
            caches.evict_namespace(&ns);
        }
        for ns in self.in_flight_namespaces.drain(..) {
            caches.cache_namespace(&ns);
        }
    }

    /// Drops in-flight entries and evicts every triple this connection
    /// touched from the triple cache. Call after a rollback.
    pub fn discard_in_flight(&mut self) {
        let caches = Arc::clone(self.persistence.caches());
        for id in self.touched_triples.drain(..) {
            caches.triple_cache().remove(&id);
        }
        for triple in self.in_flight_triples.drain(..) {
            caches.triple_cache().remove(&triple.id());
        }
        self.in_flight_nodes.clear();
        self.in_flight_namespaces.clear();
        self.removed_namespaces.clear();
    }

    // ---- nodes ----

    fn query_node(&mut self, sql: &str, params: impl rusqlite::Params) -> Result<Option<Node>> {
        let row = self
            .conn
            .prepare_cached(sql)?
            .query_row(params, NodeRow::read)
            .optional()?;
        row.map(|row| self.node_from_row(row)).transpose()
    }

    /// Loads a node by surrogate id from the database.
    pub fn load_node_by_id(&mut self, id: i64) -> Result<Option<Node>> {
        let sql = format!("SELECT {} FROM nodes WHERE id = ?1", NODE_COLUMNS);
        self.query_node(&sql, params![id])
    }

    /// Returns the node with the given id from the node cache or the
    /// database.
    pub fn resolve_node(&mut self, id: i64) -> Result<Option<Node>> {
        if let Some(node) = self.persistence.caches().node_cache().get(&id) {
            return Ok(Some(node));
        }
        let node = self.load_node_by_id(id)?;
        if let Some(node) = &node {
            self.cache_node(node);
        }
        Ok(node)
    }

    /// Loads a URI node by its URI.
    pub fn load_uri_resource(&mut self, uri: &str) -> Result<Option<Node>> {
        let sql = format!(
            "SELECT {} FROM nodes WHERE ntype = 'uri' AND svalue = ?1",
            NODE_COLUMNS
        );
        self.query_node(&sql, params![uri])
    }

    /// Loads a blank node by its label.
    pub fn load_anon_resource(&mut self, label: &str) -> Result<Option<Node>> {
        let sql = format!(
            "SELECT {} FROM nodes WHERE ntype = 'bnode' AND svalue = ?1",
            NODE_COLUMNS
        );
        self.query_node(&sql, params![label])
    }

    /// Loads a literal by content, language and datatype node id.
    pub fn load_literal(
        &mut self,
        content: &str,
        language: Option<&str>,
        datatype_id: Option<i64>,
    ) -> Result<Option<Node>> {
        let sql = format!(
            "SELECT {} FROM nodes
             WHERE ntype NOT IN ('uri', 'bnode')
               AND svalue = ?1 AND IFNULL(ltype, -1) = ?2 AND IFNULL(lang, '') = ?3",
            NODE_COLUMNS
        );
        self.query_node(
            &sql,
            params![content, datatype_id.unwrap_or(-1), language.unwrap_or("")],
        )
    }

    /// Loads the stored row with the same natural key as `node`.
    pub fn load_node(&mut self, node: &Node) -> Result<Option<Node>> {
        match node {
            Node::Uri(n) => self.load_uri_resource(n.uri()),
            Node::BNode(n) => self.load_anon_resource(n.label()),
            _ => {
                let datatype_id = match node.datatype() {
                    Some(dt) if dt.id() < 0 => return Ok(None),
                    Some(dt) => Some(dt.id()),
                    None => None,
                };
                self.load_literal(
                    node.literal_content().unwrap_or_default(),
                    node.language(),
                    datatype_id,
                )
            }
        }
    }

    /// Stores a node, assigning its id from the node sequence.
    ///
    /// There is at most one row per natural key: if the node already exists
    /// the existing row's id and creation time are adopted instead.
    pub fn store_node(&mut self, node: &mut Node) -> Result<()> {
        if node.is_persisted() {
            return Ok(());
        }
        let ltype = match node.datatype() {
            Some(dt) if dt.id() < 0 => {
                return Err(Error::DataAccess(format!(
                    "datatype {} of literal {} is not persisted",
                    dt.uri(),
                    node
                )))
            }
            Some(dt) => Some(dt.id()),
            None => None,
        };
        self.begin_write()?;

        let id = self.persistence.sequences().next(Sequence::Nodes);
        let (svalue, ivalue, dvalue, tvalue, tzoffset, bvalue) = column_values(node);
        let inserted = self
            .conn
            .prepare_cached(
                "INSERT INTO nodes
                    (id, ntype, svalue, ivalue, dvalue, tvalue, tzoffset, bvalue, ltype, lang, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT DO NOTHING",
            )?
            .execute(params![
                id,
                node.kind().as_str(),
                svalue,
                ivalue,
                dvalue,
                tvalue,
                tzoffset,
                bvalue,
                ltype,
                node.language(),
                format_timestamp(&node.created()),
            ])?;

        if inserted == 1 {
            node.set_id(id);
            log::debug!("stored node {} with id {}", node, id);
        } else {
            let existing = self.load_node(node)?.ok_or_else(|| {
                Error::DataAccess(format!("node {} conflicted but cannot be loaded", node))
            })?;
            node.set_id(existing.id());
            node.set_created(existing.created());
        }
        self.in_flight_nodes.push(node.clone());
        Ok(())
    }

    fn node_from_row(&mut self, row: NodeRow) -> Result<Node> {
        let kind = NodeKind::parse(&row.ntype)
            .ok_or_else(|| Error::DataAccess(format!("unknown node type {:?}", row.ntype)))?;
        let datatype = match row.ltype {
            Some(ltype) if kind.is_literal() => match self.resolve_node(ltype)? {
                Some(Node::Uri(dt)) => Some(Arc::new(dt)),
                _ => {
                    return Err(Error::DataAccess(format!(
                        "node {} has a dangling datatype {}",
                        row.id, ltype
                    )))
                }
            },
            _ => None,
        };
        let missing = |col: &str| {
            Error::DataAccess(format!("node {} has no {} value", row.id, col))
        };

        let mut node = match kind {
            NodeKind::Uri => Node::uri(row.svalue),
            NodeKind::BNode => Node::bnode(row.svalue),
            NodeKind::String => Node::string_literal(row.svalue, row.lang.as_deref(), datatype),
            NodeKind::Int => Node::int_literal(row.ivalue.ok_or_else(|| missing("ivalue"))?, datatype),
            NodeKind::Double => {
                Node::double_literal(row.dvalue.ok_or_else(|| missing("dvalue"))?, datatype)
            }
            NodeKind::Boolean => {
                Node::boolean_literal(row.bvalue.ok_or_else(|| missing("bvalue"))?, datatype)
            }
            NodeKind::Date => {
                let tvalue = row.tvalue.as_deref().ok_or_else(|| missing("tvalue"))?;
                let offset = FixedOffset::east_opt(row.tzoffset.unwrap_or(0))
                    .ok_or_else(|| missing("valid tzoffset"))?;
                let value = parse_timestamp(tvalue)?.with_timezone(&offset);
                Node::date_literal(value, datatype)
            }
        };
        node.set_id(row.id);
        node.set_created(parse_timestamp(&row.created_at)?);
        Ok(node)
    }

    // ---- triples ----

    /// Id of the non-deleted triple with the given node ids.
    pub fn get_triple_id(
        &mut self,
        subject: i64,
        predicate: i64,
        object: i64,
        context: i64,
    ) -> Result<Option<i64>> {
        let id = self
            .conn
            .prepare_cached(
                "SELECT id FROM triples
                 WHERE subject = ?1 AND predicate = ?2 AND object = ?3 AND context = ?4
                   AND deleted = 0",
            )?
            .query_row(params![subject, predicate, object, context], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    /// Loads a triple by id from the triple cache or the database.
    pub fn load_triple_by_id(&mut self, id: i64) -> Result<Option<Triple>> {
        if let Some(triple) = self.persistence.caches().triple_cache().get(&id) {
            return Ok(Some(triple));
        }
        let sql = format!("SELECT {} FROM triples WHERE id = ?1", TRIPLE_COLUMNS);
        let row = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![id], TripleRow::read)
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };
        let triple = self.triple_from_row(row)?;
        self.cache_triple(&triple);
        Ok(Some(triple))
    }

    /// Stores a triple under its id.
    ///
    /// Returns `false` if a non-deleted triple with the same node ids is
    /// already stored; the triple then adopts that row's id and timestamp.
    /// The triple's nodes must be persisted.
    pub fn store_triple(&mut self, triple: &mut Triple) -> Result<bool> {
        let context = triple
            .context()
            .ok_or_else(|| Error::InvalidTriple(format!("triple {} has no context", triple)))?
            .id();
        let (s, p, o) = (
            triple.subject().id(),
            triple.predicate().id(),
            triple.object().id(),
        );
        if s < 0 || p < 0 || o < 0 || context < 0 {
            return Err(Error::InvalidTriple(format!(
                "triple {} references unpersisted nodes",
                triple
            )));
        }
        if triple.id < 0 {
            triple.id = self.persistence.sequences().next(Sequence::Triples);
        }
        self.begin_write()?;

        let inserted = self
            .conn
            .prepare_cached(
                "INSERT INTO triples
                    (id, subject, predicate, object, context, creator, inferred, deleted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)
                 ON CONFLICT DO NOTHING",
            )?
            .execute(params![
                triple.id,
                s,
                p,
                o,
                context,
                triple.creator().map(Node::id),
                triple.inferred,
                format_timestamp(&triple.created),
            ])?;

        if inserted == 1 {
            triple.deleted = false;
            triple.deleted_at = None;
            self.touched_triples.push(triple.id);
            self.in_flight_triples.push(triple.clone());
            log::debug!("stored triple {} with id {}", triple, triple.id);
            return Ok(true);
        }

        match self.get_triple_id(s, p, o, context)? {
            Some(existing) => {
                if let Some(stored) = self.load_triple_by_id(existing)? {
                    triple.created = stored.created;
                    triple.inferred = stored.inferred;
                }
                triple.id = existing;
                triple.deleted = false;
                Ok(false)
            }
            // the id belongs to a deleted row
            None => {
                triple.id = self.persistence.sequences().next(Sequence::Triples);
                self.store_triple(triple)
            }
        }
    }

    /// Marks a triple as deleted. Returns `false` if it was not stored or
    /// already deleted.
    pub fn delete_triple(&mut self, triple: &mut Triple) -> Result<bool> {
        if triple.id < 0 {
            return Ok(false);
        }
        self.begin_write()?;
        let now = Utc::now();
        let changed = self
            .conn
            .prepare_cached(
                "UPDATE triples SET deleted = 1, deleted_at = ?2 WHERE id = ?1 AND deleted = 0",
            )?
            .execute(params![triple.id, format_timestamp(&now)])?;
        self.touched_triples.push(triple.id);
        self.in_flight_triples.retain(|t| t.id != triple.id);
        if changed == 0 {
            return Ok(false);
        }
        triple.deleted = true;
        triple.deleted_at = Some(now);
        Ok(true)
    }

    fn triple_from_row(&mut self, row: TripleRow) -> Result<Triple> {
        let subject = self.require_node(row.subject)?;
        let predicate = self.require_node(row.predicate)?;
        let object = self.require_node(row.object)?;
        let context = self.require_node(row.context)?;
        let creator = match row.creator {
            Some(id) => self.resolve_node(id)?,
            None => None,
        };

        let mut triple = Triple::new(subject, predicate, object, Some(context))?;
        triple.set_creator(creator);
        triple.id = row.id;
        triple.inferred = row.inferred;
        triple.deleted = row.deleted;
        triple.created = parse_timestamp(&row.created_at)?;
        triple.deleted_at = row.deleted_at.as_deref().map(parse_timestamp).transpose()?;
        Ok(triple)
    }

    fn require_node(&mut self, id: i64) -> Result<Node> {
        self.resolve_node(id)?
            .ok_or_else(|| Error::DataAccess(format!("dangling node reference {}", id)))
    }

    /// Lists non-deleted triples matching the given slots. `None` matches
    /// anything; a node that was never stored matches nothing.
    pub fn list_triples(
        &mut self,
        subject: Option<&Node>,
        predicate: Option<&Node>,
        object: Option<&Node>,
        context: Option<&Node>,
        include_inferred: bool,
    ) -> Result<Vec<Triple>> {
        let mut sql = format!("SELECT {} FROM triples WHERE deleted = 0", TRIPLE_COLUMNS);
        let mut values = Vec::new();
        for (column, node) in [
            ("subject", subject),
            ("predicate", predicate),
            ("object", object),
            ("context", context),
        ] {
            if let Some(node) = node {
                let Some(id) = self.node_id(node)? else {
                    return Ok(Vec::new());
                };
                values.push(id);
                sql.push_str(&format!(" AND {} = ?{}", column, values.len()));
            }
        }
        if !include_inferred {
            sql.push_str(" AND inferred = 0");
        }
        sql.push_str(" ORDER BY id");

        let rows = {
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), TripleRow::read)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        rows.into_iter().map(|row| self.triple_from_row(row)).collect()
    }

    /// The stored id of a node: its own id, or the id of the row with the
    /// same natural key.
    pub fn node_id(&mut self, node: &Node) -> Result<Option<i64>> {
        if node.is_persisted() {
            return Ok(Some(node.id()));
        }
        Ok(self.load_node(node)?.map(|n| n.id()))
    }

    /// Contexts holding at least one non-deleted triple.
    pub fn list_contexts(&mut self) -> Result<Vec<Node>> {
        let ids = {
            let mut stmt = self
                .conn
                .prepare_cached("SELECT DISTINCT context FROM triples WHERE deleted = 0 ORDER BY context")?;
            let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            ids.collect::<rusqlite::Result<Vec<_>>>()?
        };
        ids.into_iter().map(|id| self.require_node(id)).collect()
    }

    /// Number of non-deleted triples, optionally within one context.
    pub fn count_triples(&mut self, context: Option<&Node>) -> Result<i64> {
        let count = match context {
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM triples WHERE deleted = 0",
                [],
                |row| row.get(0),
            )?,
            Some(ctx) => match self.node_id(ctx)? {
                None => 0,
                Some(id) => self.conn.query_row(
                    "SELECT COUNT(*) FROM triples WHERE deleted = 0 AND context = ?1",
                    params![id],
                    |row| row.get(0),
                )?,
            },
        };
        Ok(count)
    }

    /// Number of non-deleted triples with the given slot ids. Used to
    /// estimate pattern cardinality.
    pub fn count_pattern(
        &self,
        subject: Option<i64>,
        predicate: Option<i64>,
        object: Option<i64>,
        context: Option<i64>,
    ) -> Result<i64> {
        let mut sql = String::from("SELECT COUNT(*) FROM triples WHERE deleted = 0");
        let mut values = Vec::new();
        for (column, id) in [
            ("subject", subject),
            ("predicate", predicate),
            ("object", object),
            ("context", context),
        ] {
            if let Some(id) = id {
                values.push(id);
                sql.push_str(&format!(" AND {} = ?{}", column, values.len()));
            }
        }
        let count = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count)
    }

    // ---- namespaces ----

    fn query_namespace(&self, sql: &str, key: &str) -> Result<Option<Namespace>> {
        let row = self
            .conn
            .prepare_cached(sql)?
            .query_row(params![key], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .optional()?;
        row.map(|(id, prefix, uri, created)| {
            Ok(Namespace {
                id,
                prefix,
                uri,
                created: parse_timestamp(&created)?,
            })
        })
        .transpose()
    }

    pub fn load_namespace_by_prefix(&mut self, prefix: &str) -> Result<Option<Namespace>> {
        if let Some(ns) = self.persistence.caches().namespace_prefix_cache().get(&prefix.to_string()) {
            return Ok(Some(ns));
        }
        let ns = self.query_namespace(
            "SELECT id, prefix, uri, created_at FROM namespaces WHERE prefix = ?1",
            prefix,
        )?;
        if let (Some(ns), false) = (&ns, self.in_write) {
            self.persistence.caches().cache_namespace(ns);
        }
        Ok(ns)
    }

    pub fn load_namespace_by_uri(&mut self, uri: &str) -> Result<Option<Namespace>> {
        if let Some(ns) = self.persistence.caches().namespace_uri_cache().get(&uri.to_string()) {
            return Ok(Some(ns));
        }
        let ns = self.query_namespace(
            "SELECT id, prefix, uri, created_at FROM namespaces WHERE uri = ?1",
            uri,
        )?;
        if let (Some(ns), false) = (&ns, self.in_write) {
            self.persistence.caches().cache_namespace(ns);
        }
        Ok(ns)
    }

    /// Stores a namespace. Prefix and URI must both be unused.
    pub fn store_namespace(&mut self, ns: &mut Namespace) -> Result<()> {
        self.begin_write()?;
        let id = self.persistence.sequences().next(Sequence::Namespaces);
        self.conn
            .prepare_cached(
                "INSERT INTO namespaces (id, prefix, uri, created_at) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![id, ns.prefix, ns.uri, format_timestamp(&ns.created)])?;
        ns.id = id;
        self.in_flight_namespaces.push(ns.clone());
        Ok(())
    }

    pub fn delete_namespace(&mut self, ns: &Namespace) -> Result<bool> {
        self.begin_write()?;
        let changed = self
            .conn
            .prepare_cached("DELETE FROM namespaces WHERE prefix = ?1")?
            .execute(params![ns.prefix])?;
        self.in_flight_namespaces.retain(|n| n.prefix != ns.prefix);
        self.removed_namespaces.push(ns.clone());
        self.persistence.caches().evict_namespace(ns);
        Ok(changed > 0)
    }

    pub fn list_namespaces(&mut self) -> Result<Vec<Namespace>> {
        let rows = {
            let mut stmt = self
                .conn
                .prepare_cached("SELECT id, prefix, uri, created_at FROM namespaces ORDER BY prefix")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        rows.into_iter()
            .map(|(id, prefix, uri, created)| {
                Ok(Namespace {
                    id,
                    prefix,
                    uri,
                    created: parse_timestamp(&created)?,
                })
            })
            .collect()
    }
}

impl Drop for KiWiConnection {
    fn drop(&mut self) {
        if self.in_write {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::error!(
                    "failed to roll back transaction {} on release: {}",
                    self.transaction_id,
                    e
                );
            }
        }
    }
}

type ColumnValues = (
    String,
    Option<i64>,
    Option<f64>,
    Option<String>,
    Option<i32>,
    Option<bool>,
);

/// The typed columns of a node row. Integers also fill `dvalue` so numeric
/// literals of both kinds order together.
fn column_values(node: &Node) -> ColumnValues {
    let svalue = match node {
        Node::Uri(n) => n.uri().to_string(),
        Node::BNode(n) => n.label().to_string(),
        _ => node.literal_content().unwrap_or_default().to_string(),
    };
    match node {
        Node::Int(_) => (svalue, node.as_integer(), node.as_double(), None, None, None),
        Node::Double(_) => (svalue, None, node.as_double(), None, None, None),
        Node::Boolean(_) => (svalue, None, None, None, None, node.as_boolean()),
        Node::Date(_) => {
            let (tvalue, tzoffset) = node
                .as_date()
                .map(|d| (Some(date_column(&d)), Some(d.offset().local_minus_utc())))
                .unwrap_or((None, None));
            (svalue, None, None, tvalue, tzoffset, None)
        }
        _ => (svalue, None, None, None, None, None),
    }
}

/// Fixed-width UTC form of a date, so lexical order is chronological.
fn date_column(value: &DateTime<FixedOffset>) -> String {
    value
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}
