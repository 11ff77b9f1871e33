//! Namespaces and the handful of vocabulary IRIs the store itself relies on.
//!
//! Namespaces are persisted in their own table and fronted by the
//! namespace-by-prefix and namespace-by-uri caches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard RDF namespace
pub const PREFIX_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
/// RDF Schema namespace
pub const PREFIX_RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
/// XML Schema datatypes namespace
pub const PREFIX_XSD: &str = "http://www.w3.org/2001/XMLSchema#";
/// OWL namespace
pub const PREFIX_OWL: &str = "http://www.w3.org/2002/07/owl#";

/// A prefix to namespace IRI mapping.
///
/// A namespace created in memory has id `-1` until the persistence layer
/// stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub(crate) id: i64,
    /// Short prefix (e.g., "rdf", "xsd")
    pub prefix: String,
    /// Full base IRI
    pub uri: String,
    /// When the mapping was first stored.
    pub created: DateTime<Utc>,
}

impl Namespace {
    /// Creates a new, not yet persisted namespace.
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: -1,
            prefix: prefix.into(),
            uri: uri.into(),
            created: Utc::now(),
        }
    }

    /// Create the RDF namespace
    pub fn rdf() -> Self {
        Self::new("rdf", PREFIX_RDF)
    }

    /// Create the RDFS namespace
    pub fn rdfs() -> Self {
        Self::new("rdfs", PREFIX_RDFS)
    }

    /// Create the XSD namespace
    pub fn xsd() -> Self {
        Self::new("xsd", PREFIX_XSD)
    }

    /// Create the OWL namespace
    pub fn owl() -> Self {
        Self::new("owl", PREFIX_OWL)
    }

    /// The surrogate id, negative while not persisted.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Expand a local name to a full IRI
    /// e.g., "type" -> "http://www.w3.org/1999/02/22-rdf-syntax-ns#type"
    pub fn expand(&self, local_name: &str) -> String {
        format!("{}{}", self.uri, local_name)
    }

    /// Check if an IRI belongs to this namespace
    pub fn contains(&self, iri: &str) -> bool {
        iri.starts_with(&self.uri)
    }

    /// Compact an IRI to prefixed form if possible
    pub fn compact(&self, iri: &str) -> Option<String> {
        iri.strip_prefix(self.uri.as_str())
            .map(|local| format!("{}:{}", self.prefix, local))
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix && self.uri == other.uri
    }
}

impl Eq for Namespace {}

/// Well-known IRIs
pub mod vocab {
    // RDF vocabulary
    pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

    // RDFS vocabulary
    pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
    pub const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";

    // XSD datatypes
    pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#int";
    pub const XSD_LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
    pub const XSD_SHORT: &str = "http://www.w3.org/2001/XMLSchema#short";
    pub const XSD_BYTE: &str = "http://www.w3.org/2001/XMLSchema#byte";
    pub const XSD_NON_NEGATIVE_INTEGER: &str =
        "http://www.w3.org/2001/XMLSchema#nonNegativeInteger";
    pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    pub const XSD_FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
    pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const XSD_DATETIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
    pub const XSD_DATE: &str = "http://www.w3.org/2001/XMLSchema#date";

    /// Returns `true` for the XSD datatypes stored as integer literals.
    pub fn is_integer_type(datatype: &str) -> bool {
        matches!(
            datatype,
            XSD_INTEGER | XSD_INT | XSD_LONG | XSD_SHORT | XSD_BYTE | XSD_NON_NEGATIVE_INTEGER
        )
    }

    /// Returns `true` for the XSD datatypes stored as floating point literals.
    pub fn is_double_type(datatype: &str) -> bool {
        matches!(datatype, XSD_DOUBLE | XSD_FLOAT | XSD_DECIMAL)
    }

    /// Returns `true` for the XSD datatypes stored as date literals.
    pub fn is_date_type(datatype: &str) -> bool {
        matches!(datatype, XSD_DATETIME | XSD_DATE)
    }
}
