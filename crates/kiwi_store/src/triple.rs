//! Statements stored in the triple table.

use chrono::{DateTime, Utc};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::node::{Node, TRANSIENT_ID};
use crate::{Error, Result};

/// An RDF statement with an optional context.
///
/// A triple is created transiently with id `-1` and receives its surrogate id
/// when the value factory resolves it against the registry and the database.
/// Removing a triple only sets its `deleted` flag; rows are never dropped.
///
/// Two triples are equal when subject, predicate, object and context are
/// equal. Ids and flags are ignored.
///
/// # Examples
///
/// ```
/// use kiwi_store::{Node, Triple};
///
/// let t = Triple::new(
///     Node::uri("http://example.org/alice"),
///     Node::uri("http://xmlns.com/foaf/0.1/name"),
///     Node::string_literal("Alice", None, None),
///     None,
/// )
/// .unwrap();
///
/// assert!(!t.is_persisted());
/// assert!(Triple::new(Node::string_literal("x", None, None), Node::uri("http://p"), Node::uri("http://o"), None).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Triple {
    pub(crate) id: i64,
    subject: Node,
    predicate: Node,
    object: Node,
    context: Option<Node>,
    creator: Option<Node>,
    pub(crate) deleted: bool,
    pub(crate) inferred: bool,
    pub(crate) new_triple: bool,
    pub(crate) created: DateTime<Utc>,
    pub(crate) deleted_at: Option<DateTime<Utc>>,
}

impl Triple {
    /// Creates a transient triple after checking the slot kinds: the subject
    /// must be a URI or blank node, the predicate a URI and the context, when
    /// present, a URI or blank node.
    pub fn new(subject: Node, predicate: Node, object: Node, context: Option<Node>) -> Result<Self> {
        validate_slots(&subject, &predicate, context.as_ref())?;
        Ok(Self {
            id: TRANSIENT_ID,
            subject,
            predicate,
            object,
            context,
            creator: None,
            deleted: false,
            inferred: false,
            new_triple: false,
            created: Utc::now(),
            deleted_at: None,
        })
    }

    /// Sets the creator of this triple.
    pub fn with_creator(mut self, creator: Node) -> Self {
        self.creator = Some(creator);
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn is_persisted(&self) -> bool {
        self.id >= 0
    }

    pub fn subject(&self) -> &Node {
        &self.subject
    }

    pub fn predicate(&self) -> &Node {
        &self.predicate
    }

    pub fn object(&self) -> &Node {
        &self.object
    }

    pub fn context(&self) -> Option<&Node> {
        self.context.as_ref()
    }

    pub fn creator(&self) -> Option<&Node> {
        self.creator.as_ref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_inferred(&self) -> bool {
        self.inferred
    }

    /// Returns `true` if the triple was minted by the transaction that
    /// created this instance rather than found in the registry or database.
    pub fn is_new(&self) -> bool {
        self.new_triple
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub(crate) fn set_context(&mut self, context: Node) {
        self.context = Some(context);
    }

    pub(crate) fn set_nodes(&mut self, subject: Node, predicate: Node, object: Node) {
        self.subject = subject;
        self.predicate = predicate;
        self.object = object;
    }

    pub(crate) fn set_creator(&mut self, creator: Option<Node>) {
        self.creator = creator;
    }

    /// Checks whether the statement matches the given slot values.
    /// `None` matches anything.
    pub fn matches(
        &self,
        subject: Option<&Node>,
        predicate: Option<&Node>,
        object: Option<&Node>,
        context: Option<&Node>,
    ) -> bool {
        subject.is_none_or(|s| s == &self.subject)
            && predicate.is_none_or(|p| p == &self.predicate)
            && object.is_none_or(|o| o == &self.object)
            && context.is_none_or(|c| self.context.as_ref() == Some(c))
    }
}

pub(crate) fn validate_slots(subject: &Node, predicate: &Node, context: Option<&Node>) -> Result<()> {
    if !subject.is_resource() {
        return Err(Error::InvalidTriple(format!(
            "subject must be a URI or blank node, got {}",
            subject
        )));
    }
    if !predicate.is_uri() {
        return Err(Error::InvalidTriple(format!(
            "predicate must be a URI, got {}",
            predicate
        )));
    }
    if let Some(ctx) = context {
        if !ctx.is_resource() {
            return Err(Error::InvalidTriple(format!(
                "context must be a URI or blank node, got {}",
                ctx
            )));
        }
    }
    Ok(())
}

impl PartialEq for Triple {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject
            && self.predicate == other.predicate
            && self.object == other.object
            && self.context == other.context
    }
}

impl Eq for Triple {}

impl Hash for Triple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subject.hash(state);
        self.predicate.hash(state);
        self.object.hash(state);
        self.context.hash(state);
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(ctx) = &self.context {
            write!(f, " {}", ctx)?;
        }
        write!(f, " .")
    }
}
