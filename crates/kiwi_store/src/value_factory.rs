//! Creation of persisted nodes and statements.
//!
//! Every term request follows the same path: look in the cache by natural
//! key, then in the database through the caller's connection, and only if
//! both miss, build the node and store it. The persistence layer keeps one
//! row per natural key, so two transactions racing for the same term end up
//! with the same id.
//!
//! Statements additionally go through the [`TripleRegistry`] under a critical
//! section, which is where triple identity across open transactions is
//! decided.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::caching::CacheManager;
use crate::namespace::vocab;
use crate::node::{Node, NodeKind, UriResource};
use crate::persistence::{KiWiConnection, Sequence};
use crate::registry::{RegistryKey, TripleRegistry};
use crate::triple::{validate_slots, Triple};
use crate::{Error, Result};

/// The value of a literal to create.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// A plain or language-tagged string.
    String {
        content: String,
        language: Option<String>,
    },
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Date(DateTime<FixedOffset>),
}

impl From<&str> for LiteralValue {
    fn from(s: &str) -> Self {
        Self::String {
            content: s.to_string(),
            language: None,
        }
    }
}

impl From<String> for LiteralValue {
    fn from(s: String) -> Self {
        Self::String {
            content: s,
            language: None,
        }
    }
}

impl From<i64> for LiteralValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for LiteralValue {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<f64> for LiteralValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for LiteralValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<DateTime<FixedOffset>> for LiteralValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Self::Date(v)
    }
}

impl From<DateTime<Utc>> for LiteralValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Date(v.fixed_offset())
    }
}

/// Factory for persisted nodes and triples.
pub struct KiWiValueFactory {
    caches: Arc<CacheManager>,
    registry: Arc<dyn TripleRegistry>,
    registry_lock: Mutex<()>,
    default_context: String,
    bnode_prefix: String,
    bnode_counter: AtomicU64,
}

impl KiWiValueFactory {
    pub fn new(
        caches: Arc<CacheManager>,
        registry: Arc<dyn TripleRegistry>,
        default_context: impl Into<String>,
    ) -> Self {
        Self {
            caches,
            registry,
            registry_lock: Mutex::new(()),
            default_context: default_context.into(),
            bnode_prefix: format!("{:x}", Utc::now().timestamp_micros()),
            bnode_counter: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<dyn TripleRegistry> {
        &self.registry
    }

    pub fn default_context(&self) -> &str {
        &self.default_context
    }

    /// Returns the persisted URI node for `uri`.
    pub fn create_uri(&self, uri: &str, conn: &mut KiWiConnection) -> Result<Node> {
        if let Some(node) = self.caches.uri_cache().get(&uri.to_string()) {
            return Ok(node);
        }
        let node = match conn.load_uri_resource(uri)? {
            Some(node) => {
                conn.cache_node(&node);
                node
            }
            None => {
                let mut node = Node::uri(uri);
                conn.store_node(&mut node)?;
                node
            }
        };
        check_persisted(&node);
        Ok(node)
    }

    /// Returns the persisted blank node with the given label, or a new blank
    /// node with a generated label.
    pub fn create_bnode(&self, label: Option<&str>, conn: &mut KiWiConnection) -> Result<Node> {
        let label = match label {
            Some(label) => label.to_string(),
            None => self.next_bnode_label(),
        };
        if let Some(node) = self.caches.bnode_cache().get(&label) {
            return Ok(node);
        }
        let node = match conn.load_anon_resource(&label)? {
            Some(node) => {
                conn.cache_node(&node);
                node
            }
            None => {
                let mut node = Node::bnode(label);
                conn.store_node(&mut node)?;
                node
            }
        };
        check_persisted(&node);
        Ok(node)
    }

    fn next_bnode_label(&self) -> String {
        let n = self.bnode_counter.fetch_add(1, Ordering::Relaxed);
        format!("b{}x{}", self.bnode_prefix, n)
    }

    fn create_datatype(&self, uri: &str, conn: &mut KiWiConnection) -> Result<Arc<UriResource>> {
        match self.create_uri(uri, conn)? {
            Node::Uri(dt) => Ok(Arc::new(dt)),
            other => Err(Error::DataAccess(format!("datatype {} is not a URI", other))),
        }
    }

    /// Returns the persisted literal for `value`.
    ///
    /// Strings get `xsd:string`, or `rdf:langString` when tagged; the other
    /// variants get `xsd:integer`, `xsd:double`, `xsd:boolean` and
    /// `xsd:dateTime`.
    pub fn create_literal(
        &self,
        value: impl Into<LiteralValue>,
        conn: &mut KiWiConnection,
    ) -> Result<Node> {
        let node = match value.into() {
            LiteralValue::String { content, language } => {
                let datatype = match language {
                    Some(_) => vocab::RDF_LANG_STRING,
                    None => vocab::XSD_STRING,
                };
                let dt = self.create_datatype(datatype, conn)?;
                Node::string_literal(content, language.as_deref(), Some(dt))
            }
            LiteralValue::Integer(v) => {
                Node::int_literal(v, Some(self.create_datatype(vocab::XSD_INTEGER, conn)?))
            }
            LiteralValue::Double(v) => {
                Node::double_literal(v, Some(self.create_datatype(vocab::XSD_DOUBLE, conn)?))
            }
            LiteralValue::Boolean(v) => {
                Node::boolean_literal(v, Some(self.create_datatype(vocab::XSD_BOOLEAN, conn)?))
            }
            LiteralValue::Date(v) => {
                Node::date_literal(v, Some(self.create_datatype(vocab::XSD_DATETIME, conn)?))
            }
        };
        self.resolve_literal(node, conn)
    }

    /// Returns the persisted string literal with an optional language tag.
    pub fn create_string_literal(
        &self,
        content: &str,
        language: Option<&str>,
        conn: &mut KiWiConnection,
    ) -> Result<Node> {
        self.create_literal(
            LiteralValue::String {
                content: content.to_string(),
                language: language.map(str::to_string),
            },
            conn,
        )
    }

    /// Returns the persisted literal with lexical form `content` and the
    /// given datatype.
    ///
    /// Integer, floating point, boolean and date datatypes are parsed into
    /// their typed representation. A lexical form that does not parse falls
    /// back to an `xsd:string` literal with the same content.
    pub fn create_typed_literal(
        &self,
        content: &str,
        datatype: &str,
        conn: &mut KiWiConnection,
    ) -> Result<Node> {
        let parsed = if vocab::is_integer_type(datatype) {
            content.trim().parse::<i64>().ok().map(LiteralValue::Integer)
        } else if vocab::is_double_type(datatype) {
            content
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| !v.is_nan())
                .map(LiteralValue::Double)
        } else if datatype == vocab::XSD_BOOLEAN {
            parse_boolean(content).map(LiteralValue::Boolean)
        } else if vocab::is_date_type(datatype) {
            parse_date(content, datatype).map(LiteralValue::Date)
        } else {
            let dt = self.create_datatype(datatype, conn)?;
            let node = Node::string_literal(content, None, Some(dt));
            return self.resolve_literal(node, conn);
        };

        let Some(value) = parsed else {
            log::warn!(
                "malformed literal {:?}^^<{}>, storing it as xsd:string",
                content,
                datatype
            );
            return self.create_string_literal(content, None, conn);
        };

        let dt = Some(self.create_datatype(datatype, conn)?);
        let node = match value {
            LiteralValue::Integer(v) => Node::int_literal(v, dt),
            LiteralValue::Double(v) => Node::double_literal(v, dt),
            LiteralValue::Boolean(v) => Node::boolean_literal(v, dt),
            LiteralValue::Date(v) => Node::date_literal(v, dt),
            LiteralValue::String { content, language } => {
                Node::string_literal(content, language.as_deref(), dt)
            }
        };
        self.resolve_literal(node, conn)
    }

    /// Cache, then database, then store. The literal's datatype must be
    /// persisted.
    fn resolve_literal(&self, node: Node, conn: &mut KiWiConnection) -> Result<Node> {
        // SQLite reads a NaN REAL back as NULL
        if node.kind() == NodeKind::Double && node.as_double().is_some_and(f64::is_nan) {
            log::warn!("literal {} is not a number, storing it as xsd:string", node);
            let content = node.literal_content().unwrap_or("NaN").to_string();
            return self.create_string_literal(&content, None, conn);
        }
        if let Some(key) = node.literal_key() {
            if let Some(cached) = self.caches.literal_cache().get(&key) {
                return Ok(cached);
            }
        }
        let node = match conn.load_node(&node)? {
            Some(loaded) => {
                conn.cache_node(&loaded);
                loaded
            }
            None => {
                let mut node = node;
                conn.store_node(&mut node)?;
                node
            }
        };
        check_persisted(&node);
        Ok(node)
    }

    /// Resolves a node, possibly built outside this store, to its persisted
    /// equivalent. Literals without a datatype get the default datatype of
    /// their kind.
    pub fn convert(&self, node: &Node, conn: &mut KiWiConnection) -> Result<Node> {
        if node.is_persisted() {
            return Ok(node.clone());
        }
        match node {
            Node::Uri(n) => self.create_uri(n.uri(), conn),
            Node::BNode(n) => self.create_bnode(Some(n.label()), conn),
            _ => {
                let datatype = match (node.datatype_uri(), node.kind()) {
                    (Some(dt), _) => dt,
                    (None, NodeKind::String) if node.language().is_some() => vocab::RDF_LANG_STRING,
                    (None, NodeKind::String) => vocab::XSD_STRING,
                    (None, NodeKind::Int) => vocab::XSD_INTEGER,
                    (None, NodeKind::Double) => vocab::XSD_DOUBLE,
                    (None, NodeKind::Boolean) => vocab::XSD_BOOLEAN,
                    (None, _) => vocab::XSD_DATETIME,
                };
                let dt = self.create_datatype(datatype, conn)?;
                self.resolve_literal(node.clone().with_datatype(Some(dt)), conn)
            }
        }
    }

    /// Returns the triple for the given statement, with its id resolved.
    ///
    /// A statement without context is placed in the default context. The
    /// id is taken from the registry if another open transaction already
    /// handed one out, else from a stored non-deleted triple, else minted
    /// from the triple sequence; in the last case the triple is flagged new.
    /// Calling this twice for the same statement in one transaction returns
    /// the same id.
    pub fn create_statement(
        &self,
        subject: &Node,
        predicate: &Node,
        object: &Node,
        context: Option<&Node>,
        conn: &mut KiWiConnection,
    ) -> Result<Triple> {
        validate_slots(subject, predicate, context)?;

        let subject = self.convert(subject, conn)?;
        let predicate = self.convert(predicate, conn)?;
        let object = self.convert(object, conn)?;
        let context = match context {
            Some(ctx) => self.convert(ctx, conn)?,
            None => self.create_uri(&self.default_context, conn)?,
        };

        let mut triple = Triple::new(subject, predicate, object, Some(context))?;
        let key = RegistryKey::from_triple(&triple);
        let txn_id = conn.transaction_id();

        let _guard = self.registry_lock.lock();
        if let Some(id) = self.registry.lookup_key(&key)? {
            triple.id = id;
            self.registry.register_key(key, txn_id, id)?;
        } else if let Some(id) =
            conn.get_triple_id(key.subject, key.predicate, key.object, key.context)?
        {
            if let Some(stored) = conn.load_triple_by_id(id)? {
                triple = stored;
            }
            triple.id = id;
        } else {
            let id = conn.persistence().sequences().next(Sequence::Triples);
            triple.id = id;
            triple.new_triple = true;
            self.registry.register_key(key, txn_id, id)?;
            log::debug!("minted triple id {} for {}", id, triple);
        }
        Ok(triple)
    }

    /// Marks a triple deleted and drops its registry entry. Returns `false`
    /// if it was not stored or already deleted.
    ///
    /// The row update may wait for the database write lock, so it runs
    /// outside the registry critical section.
    pub fn remove_statement(&self, triple: &mut Triple, conn: &mut KiWiConnection) -> Result<bool> {
        let removed = conn.delete_triple(triple)?;
        let _guard = self.registry_lock.lock();
        self.registry.delete_key(&RegistryKey::from_triple(triple))?;
        Ok(removed)
    }

    /// Releases the registry entries of the connection's transaction.
    pub fn release_registry(&self, conn: &KiWiConnection) -> Result<()> {
        self.registry.release_transaction(conn.transaction_id())
    }
}

fn check_persisted(node: &Node) {
    if !node.is_persisted() {
        log::error!("node {} has no id after create-or-load", node);
    }
}

fn parse_boolean(content: &str) -> Option<bool> {
    match content.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_date(content: &str, datatype: &str) -> Option<DateTime<FixedOffset>> {
    let content = content.trim();
    if datatype == vocab::XSD_DATE {
        NaiveDate::parse_from_str(content, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().fixed_offset())
    } else {
        DateTime::parse_from_rfc3339(content).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, KiWiConfiguration};
    use crate::persistence::KiWiPersistence;
    use crate::registry::LocalTripleRegistry;

    struct Fixture {
        _dir: tempfile::TempDir,
        persistence: Arc<KiWiPersistence>,
        factory: KiWiValueFactory,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = KiWiConfiguration::sqlite(dir.path().join("kiwi.db"));
        let caches = Arc::new(CacheManager::new(&CacheConfig::default()));
        let persistence = Arc::new(KiWiPersistence::open(&config, Arc::clone(&caches)).unwrap());
        let factory = KiWiValueFactory::new(
            caches,
            Arc::new(LocalTripleRegistry::new()),
            crate::config::DEFAULT_CONTEXT,
        );
        Fixture {
            _dir: dir,
            persistence,
            factory,
        }
    }

    #[test]
    fn test_create_uri_is_idempotent() {
        let fx = fixture();
        let mut conn = fx.persistence.connection().unwrap();
        let a = fx.factory.create_uri("http://example.org/a", &mut conn).unwrap();
        let b = fx.factory.create_uri("http://example.org/a", &mut conn).unwrap();
        assert!(a.is_persisted());
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_generated_bnodes_are_distinct() {
        let fx = fixture();
        let mut conn = fx.persistence.connection().unwrap();
        let a = fx.factory.create_bnode(None, &mut conn).unwrap();
        let b = fx.factory.create_bnode(None, &mut conn).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());

        let named = fx.factory.create_bnode(Some("x"), &mut conn).unwrap();
        let again = fx.factory.create_bnode(Some("x"), &mut conn).unwrap();
        assert_eq!(named.id(), again.id());
    }

    #[test]
    fn test_literal_datatypes() {
        let fx = fixture();
        let mut conn = fx.persistence.connection().unwrap();

        let plain = fx.factory.create_literal("hello", &mut conn).unwrap();
        assert_eq!(plain.datatype_uri(), Some(vocab::XSD_STRING));

        let tagged = fx
            .factory
            .create_string_literal("hallo", Some("de"), &mut conn)
            .unwrap();
        assert_eq!(tagged.datatype_uri(), Some(vocab::RDF_LANG_STRING));
        assert_eq!(tagged.language(), Some("de"));

        let int = fx.factory.create_literal(42i64, &mut conn).unwrap();
        assert_eq!(int.kind(), NodeKind::Int);
        assert_eq!(int.datatype_uri(), Some(vocab::XSD_INTEGER));

        let flag = fx.factory.create_literal(true, &mut conn).unwrap();
        assert_eq!(flag.as_boolean(), Some(true));
    }

    #[test]
    fn test_typed_literal_parsing() {
        let fx = fixture();
        let mut conn = fx.persistence.connection().unwrap();

        let int = fx
            .factory
            .create_typed_literal(" 30 ", vocab::XSD_INT, &mut conn)
            .unwrap();
        assert_eq!(int.as_integer(), Some(30));
        assert_eq!(int.datatype_uri(), Some(vocab::XSD_INT));

        let date = fx
            .factory
            .create_typed_literal("2024-01-01", vocab::XSD_DATE, &mut conn)
            .unwrap();
        assert_eq!(date.kind(), NodeKind::Date);
        assert_eq!(date.literal_content(), Some("2024-01-01"));

        let custom = fx
            .factory
            .create_typed_literal("x", "http://example.org/type", &mut conn)
            .unwrap();
        assert_eq!(custom.kind(), NodeKind::String);
        assert_eq!(custom.datatype_uri(), Some("http://example.org/type"));
    }

    #[test]
    fn test_malformed_literal_falls_back_to_string() {
        let fx = fixture();
        let mut conn = fx.persistence.connection().unwrap();
        let node = fx
            .factory
            .create_typed_literal("abc", vocab::XSD_INTEGER, &mut conn)
            .unwrap();
        assert_eq!(node.kind(), NodeKind::String);
        assert_eq!(node.literal_content(), Some("abc"));
        assert_eq!(node.datatype_uri(), Some(vocab::XSD_STRING));
    }

    #[test]
    fn test_nan_literal_is_stored_as_string() {
        let fx = fixture();
        let mut conn = fx.persistence.connection().unwrap();
        let typed = fx
            .factory
            .create_typed_literal("NaN", vocab::XSD_DOUBLE, &mut conn)
            .unwrap();
        assert_eq!(typed.kind(), NodeKind::String);
        assert_eq!(typed.literal_content(), Some("NaN"));
        assert_eq!(typed.datatype_uri(), Some(vocab::XSD_STRING));

        let direct = fx.factory.create_literal(f64::NAN, &mut conn).unwrap();
        assert_eq!(direct.kind(), NodeKind::String);
        assert_eq!(direct.id(), typed.id());
        conn.commit().unwrap();
        conn.publish_in_flight();

        fx.factory.caches.clear();
        let mut conn = fx.persistence.connection().unwrap();
        let loaded = conn.load_node_by_id(typed.id()).unwrap().unwrap();
        assert_eq!(loaded.literal_content(), Some("NaN"));
        let again = fx
            .factory
            .create_typed_literal("NaN", vocab::XSD_DOUBLE, &mut conn)
            .unwrap();
        assert_eq!(again.id(), typed.id());
    }

    #[test]
    fn test_convert_transient_nodes() {
        let fx = fixture();
        let mut conn = fx.persistence.connection().unwrap();
        let uri = fx
            .factory
            .convert(&Node::uri("http://example.org/a"), &mut conn)
            .unwrap();
        assert!(uri.is_persisted());

        let lit = fx
            .factory
            .convert(&Node::int_literal(5, None), &mut conn)
            .unwrap();
        assert_eq!(lit.datatype_uri(), Some(vocab::XSD_INTEGER));
        let same = fx.factory.create_literal(5i64, &mut conn).unwrap();
        assert_eq!(lit.id(), same.id());
    }

    #[test]
    fn test_create_statement_is_idempotent_within_transaction() {
        let fx = fixture();
        let mut conn = fx.persistence.connection().unwrap();
        let s = Node::uri("http://example.org/s");
        let p = Node::uri("http://example.org/p");
        let o = Node::string_literal("o", None, None);

        let t1 = fx.factory.create_statement(&s, &p, &o, None, &mut conn).unwrap();
        let t2 = fx.factory.create_statement(&s, &p, &o, None, &mut conn).unwrap();
        assert!(t1.is_new());
        assert_eq!(t1.id(), t2.id());
        assert_eq!(t1.context().and_then(Node::as_uri), Some(crate::config::DEFAULT_CONTEXT));
    }

    #[test]
    fn test_create_statement_rejects_bad_slots() {
        let fx = fixture();
        let mut conn = fx.persistence.connection().unwrap();
        let lit = Node::string_literal("x", None, None);
        let p = Node::uri("http://example.org/p");
        assert!(fx.factory.create_statement(&lit, &p, &lit, None, &mut conn).is_err());
        // nothing was written
        assert!(!conn.has_changes());
    }

    #[test]
    fn test_release_registry() {
        let fx = fixture();
        let mut conn = fx.persistence.connection().unwrap();
        let s = Node::uri("http://example.org/s");
        let t = fx.factory.create_statement(&s, &s, &s, None, &mut conn).unwrap();
        let key = RegistryKey::from_triple(&t);
        assert_eq!(fx.factory.registry().lookup_key(&key).unwrap(), Some(t.id()));

        fx.factory.release_registry(&conn).unwrap();
        assert_eq!(fx.factory.registry().lookup_key(&key).unwrap(), None);
    }
}
