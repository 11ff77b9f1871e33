//! RDF terms stored in the node table.
//!
//! A [`Node`] is a URI, a blank node, or one of five literal kinds. Every node
//! carries a surrogate id, negative until the persistence layer assigns one,
//! and its creation timestamp. Identity is the natural key: the URI string,
//! the blank node label, or a literal's content, language and datatype URI.
//! Surrogate ids never take part in equality.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::namespace::vocab;

/// Id of a node or triple that has not been persisted yet.
pub const TRANSIENT_ID: i64 = -1;

/// A URI resource.
#[derive(Debug, Clone)]
pub struct UriResource {
    pub(crate) id: i64,
    pub(crate) created: DateTime<Utc>,
    uri: String,
}

impl UriResource {
    /// Creates a transient URI resource.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            id: TRANSIENT_ID,
            created: Utc::now(),
            uri: uri.into(),
        }
    }

    /// The absolute URI string.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The surrogate id, negative while not persisted.
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl PartialEq for UriResource {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for UriResource {}

/// A blank node, identified by an opaque label.
#[derive(Debug, Clone)]
pub struct AnonResource {
    pub(crate) id: i64,
    pub(crate) created: DateTime<Utc>,
    label: String,
}

impl AnonResource {
    /// Creates a transient blank node.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: TRANSIENT_ID,
            created: Utc::now(),
            label: label.into(),
        }
    }

    /// The blank node label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// A string literal with an optional language tag.
#[derive(Debug, Clone)]
pub struct StringLiteral {
    pub(crate) id: i64,
    pub(crate) created: DateTime<Utc>,
    content: String,
    language: Option<String>,
    datatype: Option<Arc<UriResource>>,
}

/// An integer literal (`xsd:integer` and its restrictions).
#[derive(Debug, Clone)]
pub struct IntLiteral {
    pub(crate) id: i64,
    pub(crate) created: DateTime<Utc>,
    content: String,
    value: i64,
    datatype: Option<Arc<UriResource>>,
}

/// A floating point literal (`xsd:double`, `xsd:float`, `xsd:decimal`).
#[derive(Debug, Clone)]
pub struct DoubleLiteral {
    pub(crate) id: i64,
    pub(crate) created: DateTime<Utc>,
    content: String,
    value: f64,
    datatype: Option<Arc<UriResource>>,
}

/// A boolean literal.
#[derive(Debug, Clone)]
pub struct BooleanLiteral {
    pub(crate) id: i64,
    pub(crate) created: DateTime<Utc>,
    content: String,
    value: bool,
    datatype: Option<Arc<UriResource>>,
}

/// A date or date-time literal.
#[derive(Debug, Clone)]
pub struct DateLiteral {
    pub(crate) id: i64,
    pub(crate) created: DateTime<Utc>,
    content: String,
    value: DateTime<FixedOffset>,
    datatype: Option<Arc<UriResource>>,
}

/// An RDF term as stored in the node table.
///
/// # Examples
///
/// ```
/// use kiwi_store::Node;
///
/// let a = Node::uri("http://example.org/a");
/// let b = Node::uri("http://example.org/a");
///
/// assert!(a.is_resource());
/// assert!(a.id() < 0); // not persisted yet
/// assert_eq!(a, b); // equality is by natural key
/// ```
#[derive(Debug, Clone)]
pub enum Node {
    /// A URI resource.
    Uri(UriResource),
    /// A blank node.
    BNode(AnonResource),
    /// A plain or language-tagged string literal, or a literal of a datatype
    /// the store has no dedicated representation for.
    String(StringLiteral),
    /// An integer literal.
    Int(IntLiteral),
    /// A floating point literal.
    Double(DoubleLiteral),
    /// A boolean literal.
    Boolean(BooleanLiteral),
    /// A date or date-time literal.
    Date(DateLiteral),
}

/// The discriminator stored in the `ntype` column of the node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Uri,
    BNode,
    String,
    Int,
    Double,
    Boolean,
    Date,
}

impl NodeKind {
    /// The column value of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uri => "uri",
            Self::BNode => "bnode",
            Self::String => "string",
            Self::Int => "int",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Date => "date",
        }
    }

    /// Parses a column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uri" => Some(Self::Uri),
            "bnode" => Some(Self::BNode),
            "string" => Some(Self::String),
            "int" => Some(Self::Int),
            "double" => Some(Self::Double),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            _ => None,
        }
    }

    /// Returns `true` for the literal kinds.
    pub fn is_literal(self) -> bool {
        !matches!(self, Self::Uri | Self::BNode)
    }
}

/// The natural key of a literal: content, language and datatype URI.
///
/// This is the key of the literal cache and of the node table lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiteralKey {
    pub content: String,
    pub language: Option<String>,
    pub datatype: Option<String>,
}

impl LiteralKey {
    pub fn new(content: &str, language: Option<&str>, datatype: Option<&str>) -> Self {
        Self {
            content: content.to_string(),
            language: language.map(str::to_lowercase),
            datatype: datatype.map(str::to_string),
        }
    }
}

/// The identity of a node independent of its surrogate id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    Uri(String),
    BNode(String),
    Literal(LiteralKey),
}

impl Node {
    /// Creates a transient URI node.
    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri(UriResource::new(uri))
    }

    /// Creates a transient blank node with the given label.
    pub fn bnode(label: impl Into<String>) -> Self {
        Self::BNode(AnonResource::new(label))
    }

    /// Creates a transient string literal. Language tags are normalised to
    /// lower case.
    pub fn string_literal(
        content: impl Into<String>,
        language: Option<&str>,
        datatype: Option<Arc<UriResource>>,
    ) -> Self {
        Self::String(StringLiteral {
            id: TRANSIENT_ID,
            created: Utc::now(),
            content: content.into(),
            language: language.map(str::to_lowercase),
            datatype,
        })
    }

    /// Creates a transient integer literal.
    pub fn int_literal(value: i64, datatype: Option<Arc<UriResource>>) -> Self {
        Self::Int(IntLiteral {
            id: TRANSIENT_ID,
            created: Utc::now(),
            content: value.to_string(),
            value,
            datatype,
        })
    }

    /// Creates a transient floating point literal.
    pub fn double_literal(value: f64, datatype: Option<Arc<UriResource>>) -> Self {
        Self::Double(DoubleLiteral {
            id: TRANSIENT_ID,
            created: Utc::now(),
            content: format!("{:?}", value),
            value,
            datatype,
        })
    }

    /// Creates a transient boolean literal.
    pub fn boolean_literal(value: bool, datatype: Option<Arc<UriResource>>) -> Self {
        Self::Boolean(BooleanLiteral {
            id: TRANSIENT_ID,
            created: Utc::now(),
            content: value.to_string(),
            value,
            datatype,
        })
    }

    /// Creates a transient date literal. An `xsd:date` datatype keeps only the
    /// calendar date in the lexical form.
    pub fn date_literal(value: DateTime<FixedOffset>, datatype: Option<Arc<UriResource>>) -> Self {
        let content = match datatype.as_deref().map(UriResource::uri) {
            Some(vocab::XSD_DATE) => value.format("%Y-%m-%d").to_string(),
            _ => value.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        };
        Self::Date(DateLiteral {
            id: TRANSIENT_ID,
            created: Utc::now(),
            content,
            value,
            datatype,
        })
    }

    /// The surrogate id, negative while not persisted.
    pub fn id(&self) -> i64 {
        match self {
            Self::Uri(n) => n.id,
            Self::BNode(n) => n.id,
            Self::String(n) => n.id,
            Self::Int(n) => n.id,
            Self::Double(n) => n.id,
            Self::Boolean(n) => n.id,
            Self::Date(n) => n.id,
        }
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        match self {
            Self::Uri(n) => n.id = id,
            Self::BNode(n) => n.id = id,
            Self::String(n) => n.id = id,
            Self::Int(n) => n.id = id,
            Self::Double(n) => n.id = id,
            Self::Boolean(n) => n.id = id,
            Self::Date(n) => n.id = id,
        }
    }

    /// When the node was created.
    pub fn created(&self) -> DateTime<Utc> {
        match self {
            Self::Uri(n) => n.created,
            Self::BNode(n) => n.created,
            Self::String(n) => n.created,
            Self::Int(n) => n.created,
            Self::Double(n) => n.created,
            Self::Boolean(n) => n.created,
            Self::Date(n) => n.created,
        }
    }

    pub(crate) fn set_created(&mut self, created: DateTime<Utc>) {
        match self {
            Self::Uri(n) => n.created = created,
            Self::BNode(n) => n.created = created,
            Self::String(n) => n.created = created,
            Self::Int(n) => n.created = created,
            Self::Double(n) => n.created = created,
            Self::Boolean(n) => n.created = created,
            Self::Date(n) => n.created = created,
        }
    }

    /// Returns `true` once the node has a surrogate id.
    pub fn is_persisted(&self) -> bool {
        self.id() >= 0
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Uri(_) => NodeKind::Uri,
            Self::BNode(_) => NodeKind::BNode,
            Self::String(_) => NodeKind::String,
            Self::Int(_) => NodeKind::Int,
            Self::Double(_) => NodeKind::Double,
            Self::Boolean(_) => NodeKind::Boolean,
            Self::Date(_) => NodeKind::Date,
        }
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, Self::Uri(_))
    }

    pub fn is_bnode(&self) -> bool {
        matches!(self, Self::BNode(_))
    }

    /// Returns `true` for nodes allowed in subject and context position.
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Uri(_) | Self::BNode(_))
    }

    pub fn is_literal(&self) -> bool {
        self.kind().is_literal()
    }

    /// The URI string of a URI node.
    pub fn as_uri(&self) -> Option<&str> {
        match self {
            Self::Uri(n) => Some(n.uri()),
            _ => None,
        }
    }

    /// The label of a blank node.
    pub fn as_bnode(&self) -> Option<&str> {
        match self {
            Self::BNode(n) => Some(n.label()),
            _ => None,
        }
    }

    /// The lexical content of a literal.
    pub fn literal_content(&self) -> Option<&str> {
        match self {
            Self::Uri(_) | Self::BNode(_) => None,
            Self::String(n) => Some(&n.content),
            Self::Int(n) => Some(&n.content),
            Self::Double(n) => Some(&n.content),
            Self::Boolean(n) => Some(&n.content),
            Self::Date(n) => Some(&n.content),
        }
    }

    /// The language tag of a string literal.
    pub fn language(&self) -> Option<&str> {
        match self {
            Self::String(n) => n.language.as_deref(),
            _ => None,
        }
    }

    /// The datatype back-reference of a literal.
    pub fn datatype(&self) -> Option<&Arc<UriResource>> {
        match self {
            Self::Uri(_) | Self::BNode(_) => None,
            Self::String(n) => n.datatype.as_ref(),
            Self::Int(n) => n.datatype.as_ref(),
            Self::Double(n) => n.datatype.as_ref(),
            Self::Boolean(n) => n.datatype.as_ref(),
            Self::Date(n) => n.datatype.as_ref(),
        }
    }

    /// Replaces the datatype of a literal. Resources are returned unchanged.
    pub(crate) fn with_datatype(mut self, datatype: Option<Arc<UriResource>>) -> Self {
        match &mut self {
            Self::Uri(_) | Self::BNode(_) => {}
            Self::String(n) => n.datatype = datatype,
            Self::Int(n) => n.datatype = datatype,
            Self::Double(n) => n.datatype = datatype,
            Self::Boolean(n) => n.datatype = datatype,
            Self::Date(n) => n.datatype = datatype,
        }
        self
    }

    /// The datatype URI of a literal.
    pub fn datatype_uri(&self) -> Option<&str> {
        self.datatype().map(|dt| dt.uri())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(n.value),
            _ => None,
        }
    }

    /// The numeric value of an integer or floating point literal.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(n.value as f64),
            Self::Double(n) => Some(n.value),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(n) => Some(n.value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Date(n) => Some(n.value),
            _ => None,
        }
    }

    /// The natural key of this node.
    pub fn natural_key(&self) -> NaturalKey {
        match self {
            Self::Uri(n) => NaturalKey::Uri(n.uri.clone()),
            Self::BNode(n) => NaturalKey::BNode(n.label.clone()),
            _ => NaturalKey::Literal(LiteralKey::new(
                self.literal_content().unwrap_or_default(),
                self.language(),
                self.datatype_uri(),
            )),
        }
    }

    /// The literal cache key of a literal node.
    pub fn literal_key(&self) -> Option<LiteralKey> {
        self.literal_content()
            .map(|content| LiteralKey::new(content, self.language(), self.datatype_uri()))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Uri(a), Self::Uri(b)) => a.uri == b.uri,
            (Self::BNode(a), Self::BNode(b)) => a.label == b.label,
            (Self::Uri(_) | Self::BNode(_), _) | (_, Self::Uri(_) | Self::BNode(_)) => false,
            _ => {
                self.literal_content() == other.literal_content()
                    && self.language() == other.language()
                    && self.datatype_uri() == other.datatype_uri()
            }
        }
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Uri(n) => {
                0u8.hash(state);
                n.uri.hash(state);
            }
            Self::BNode(n) => {
                1u8.hash(state);
                n.label.hash(state);
            }
            _ => {
                2u8.hash(state);
                self.literal_content().hash(state);
                self.language().hash(state);
                self.datatype_uri().hash(state);
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uri(n) => write!(f, "<{}>", n.uri),
            Self::BNode(n) => write!(f, "_:{}", n.label),
            _ => {
                let content = self.literal_content().unwrap_or_default();
                write!(f, "\"{}\"", content.replace('\\', "\\\\").replace('"', "\\\""))?;
                if let Some(lang) = self.language() {
                    write!(f, "@{}", lang)
                } else if let Some(dt) = self.datatype_uri() {
                    write!(f, "^^<{}>", dt)
                } else {
                    Ok(())
                }
            }
        }
    }
}
