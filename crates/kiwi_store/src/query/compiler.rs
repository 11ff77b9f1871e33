//! Translation of pattern queries into [`SelectQuery`] statements.
//!
//! Naming scheme of the generated statement:
//! - `P1..Pn`: one `triples` entry per pattern, in pattern order
//! - `V1..Vm`: one projected column per variable, numbered by first occurrence
//! - `P{i}_{S|P|O|C}_V{k}`: the `nodes` join of variable `V{k}` in slot
//!   S, P, O or C of pattern `P{i}`
//! - `J1..Jn`: the triple id of each pattern in the order the caller
//!   listed them, when justifications are requested

use indexmap::IndexMap;
use std::collections::HashSet;

use super::sql::{Column, Condition, Join, OrderTerm, Projection, SelectQuery, TableRef};
use super::{Filter, Pattern, PatternQuery, PatternTerm};
use crate::node::Node;
use crate::persistence::KiWiConnection;
use crate::{Error, Result};

/// A pattern slot with its fixed node resolved to a node id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Id(i64),
    Var(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPattern {
    /// Position of the pattern in the caller's query.
    pub index: usize,
    pub subject: Slot,
    pub predicate: Slot,
    pub object: Slot,
    pub context: Option<Slot>,
}

impl ResolvedPattern {
    /// Column name, alias letter and slot for each constrained slot.
    fn slots(&self) -> impl Iterator<Item = (&'static str, char, &Slot)> {
        [
            ("subject", 'S', Some(&self.subject)),
            ("predicate", 'P', Some(&self.predicate)),
            ("object", 'O', Some(&self.object)),
            ("context", 'C', self.context.as_ref()),
        ]
        .into_iter()
        .filter_map(|(column, letter, slot)| slot.map(|s| (column, letter, s)))
    }

    /// Ids of the fixed slots, `None` for variables and open contexts.
    pub fn bound_ids(&self) -> [Option<i64>; 4] {
        let id = |slot: Option<&Slot>| match slot {
            Some(Slot::Id(id)) => Some(*id),
            _ => None,
        };
        [
            id(Some(&self.subject)),
            id(Some(&self.predicate)),
            id(Some(&self.object)),
            id(self.context.as_ref()),
        ]
    }
}

/// A validated query with all fixed nodes resolved to ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedQuery {
    pub patterns: Vec<ResolvedPattern>,
    /// Initial bindings of variables the patterns mention.
    pub bindings: Vec<(String, i64)>,
    /// Initial bindings of variables no pattern mentions.
    pub extra_bindings: Vec<(String, Node)>,
    pub same_terms: Vec<(String, String)>,
    pub same_values: Vec<(String, i64)>,
    pub order_by: Vec<String>,
    pub justifications: bool,
    pub limit: Option<usize>,
}

/// The statement for a query and the meaning of its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub select: SelectQuery,
    /// Variable names of the leading projected columns.
    pub variables: Vec<String>,
    /// Number of trailing triple id columns.
    pub justifications: usize,
}

fn pattern_variables(patterns: &[Pattern]) -> HashSet<&str> {
    patterns
        .iter()
        .flat_map(Pattern::terms)
        .filter_map(PatternTerm::as_variable)
        .collect()
}

/// Rejects requests that cannot be compiled.
pub fn validate(query: &PatternQuery) -> Result<()> {
    if query.patterns.is_empty() {
        return Err(Error::InvalidQuery("empty pattern set".into()));
    }
    for filter in &query.filters {
        match filter {
            Filter::SameTerm(..) | Filter::SameValue(..) => {}
            Filter::Regex(var, _) => {
                return Err(Error::UnsupportedFilter(format!("regex on ?{}", var)))
            }
            Filter::Compare(var, op, _) => {
                return Err(Error::UnsupportedFilter(format!("{:?} comparison on ?{}", op, var)))
            }
        }
    }

    let variables = pattern_variables(&query.patterns);
    if variables.contains("") {
        return Err(Error::InvalidQuery("empty variable name".into()));
    }
    let require = |var: &str, role: &str| {
        if variables.contains(var) {
            Ok(())
        } else {
            Err(Error::InvalidQuery(format!(
                "{} variable ?{} does not occur in any pattern",
                role, var
            )))
        }
    };
    for var in &query.order_by {
        require(var, "order by")?;
    }
    for filter in &query.filters {
        match filter {
            Filter::SameTerm(a, b) => {
                require(a, "filter")?;
                require(b, "filter")?;
            }
            Filter::SameValue(var, _) => require(var, "filter")?,
            _ => {}
        }
    }
    Ok(())
}

/// Resolves the fixed nodes of a validated query to ids.
///
/// Returns `None` if some fixed node was never stored, in which case the
/// query cannot match anything.
pub fn resolve(query: &PatternQuery, conn: &mut KiWiConnection) -> Result<Option<ResolvedQuery>> {
    let mut resolved = ResolvedQuery {
        order_by: query.order_by.clone(),
        justifications: query.justifications,
        limit: query.limit,
        ..Default::default()
    };

    for (index, pattern) in query.patterns.iter().enumerate() {
        let mut slot = |term: &PatternTerm| -> Result<Option<Slot>> {
            Ok(match term {
                PatternTerm::Variable(name) => Some(Slot::Var(name.clone())),
                PatternTerm::Value(node) => conn.node_id(node)?.map(Slot::Id),
            })
        };
        let (Some(subject), Some(predicate), Some(object)) = (
            slot(&pattern.subject)?,
            slot(&pattern.predicate)?,
            slot(&pattern.object)?,
        ) else {
            return Ok(None);
        };
        let context = match &pattern.context {
            None => None,
            Some(term) => match slot(term)? {
                Some(s) => Some(s),
                None => return Ok(None),
            },
        };
        resolved.patterns.push(ResolvedPattern {
            index,
            subject,
            predicate,
            object,
            context,
        });
    }

    let variables = pattern_variables(&query.patterns);
    let mut names: Vec<&String> = query.bindings.keys().collect();
    names.sort();
    for name in names {
        let node = &query.bindings[name];
        if variables.contains(name.as_str()) {
            match conn.node_id(node)? {
                Some(id) => resolved.bindings.push((name.clone(), id)),
                None => return Ok(None),
            }
        } else {
            resolved.extra_bindings.push((name.clone(), node.clone()));
        }
    }

    for filter in &query.filters {
        match filter {
            Filter::SameTerm(a, b) => resolved.same_terms.push((a.clone(), b.clone())),
            Filter::SameValue(var, node) => match conn.node_id(node)? {
                Some(id) => resolved.same_values.push((var.clone(), id)),
                None => return Ok(None),
            },
            Filter::Regex(..) | Filter::Compare(..) => {}
        }
    }
    Ok(Some(resolved))
}

struct Variable {
    alias: String,
    first: Column,
    node_alias: String,
}

/// Builds the SELECT statement for a resolved query.
pub fn compile(query: &ResolvedQuery) -> CompiledQuery {
    let mut select = SelectQuery::default();
    let mut vars: IndexMap<String, Variable> = IndexMap::new();

    for (i, pattern) in query.patterns.iter().enumerate() {
        let alias = format!("P{}", i + 1);
        let mut table = TableRef {
            table: "triples",
            alias: alias.clone(),
            joins: Vec::new(),
        };

        for (column, letter, slot) in pattern.slots() {
            let here = Column::new(&alias, column);
            match slot {
                Slot::Id(id) => select.conditions.push(Condition::param(here, *id)),
                Slot::Var(name) => {
                    let number = vars.len() + 1;
                    let var = vars.entry(name.clone()).or_insert_with(|| Variable {
                        alias: format!("V{}", number),
                        first: here.clone(),
                        node_alias: String::new(),
                    });
                    let join_alias = format!("{}_{}_{}", alias, letter, var.alias);
                    if var.node_alias.is_empty() {
                        var.node_alias = join_alias.clone();
                    } else {
                        select
                            .conditions
                            .push(Condition::columns(here.clone(), var.first.clone()));
                    }
                    table.joins.push(Join {
                        table: "nodes",
                        alias: join_alias.clone(),
                        on: vec![Condition::columns(Column::new(&join_alias, "id"), here)],
                    });
                }
            }
        }

        select
            .conditions
            .push(Condition::param(Column::new(&alias, "deleted"), 0));
        select.from.push(table);
    }

    for (name, id) in &query.bindings {
        if let Some(var) = vars.get(name) {
            select.conditions.push(Condition::param(var.first.clone(), *id));
        }
    }
    for (a, b) in &query.same_terms {
        if let (Some(a), Some(b)) = (vars.get(a), vars.get(b)) {
            select
                .conditions
                .push(Condition::columns(a.first.clone(), b.first.clone()));
        }
    }
    for (name, id) in &query.same_values {
        if let Some(var) = vars.get(name) {
            select.conditions.push(Condition::param(var.first.clone(), *id));
        }
    }

    for var in vars.values() {
        select.projections.push(Projection {
            column: Column::new(&var.node_alias, "id"),
            alias: var.alias.clone(),
        });
    }
    let justifications = if query.justifications {
        query.patterns.len()
    } else {
        0
    };
    if justifications > 0 {
        let mut positions: Vec<usize> = (0..query.patterns.len()).collect();
        positions.sort_by_key(|&k| query.patterns[k].index);
        for (j, k) in positions.into_iter().enumerate() {
            select.projections.push(Projection {
                column: Column::new(format!("P{}", k + 1), "id"),
                alias: format!("J{}", j + 1),
            });
        }
    }

    // numeric value first, then date, then lexical form
    for name in &query.order_by {
        if let Some(var) = vars.get(name) {
            for column in ["dvalue", "tvalue", "svalue"] {
                select.order_by.push(OrderTerm {
                    column: Column::new(&var.node_alias, column),
                    ascending: true,
                });
            }
        }
    }
    select.limit = query.limit;

    CompiledQuery {
        select,
        variables: vars.keys().cloned().collect(),
        justifications,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::sql::{SqlDialect, SqliteDialect};
    use crate::query::CompareOp;

    fn var(name: &str) -> Slot {
        Slot::Var(name.to_string())
    }

    fn person_query() -> ResolvedQuery {
        ResolvedQuery {
            patterns: vec![
                ResolvedPattern {
                    index: 0,
                    subject: var("x"),
                    predicate: Slot::Id(1),
                    object: Slot::Id(2),
                    context: None,
                },
                ResolvedPattern {
                    index: 1,
                    subject: var("x"),
                    predicate: Slot::Id(3),
                    object: var("age"),
                    context: None,
                },
            ],
            order_by: vec!["age".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_compile_join() {
        let compiled = compile(&person_query());
        assert_eq!(compiled.variables, vec!["x".to_string(), "age".to_string()]);
        assert_eq!(compiled.justifications, 0);

        let (sql, params) = SqliteDialect.render(&compiled.select);
        assert!(sql.starts_with("SELECT P1_S_V1.id AS V1, P2_O_V2.id AS V2\n"));
        assert!(sql.contains("INNER JOIN nodes AS P1_S_V1 ON P1_S_V1.id = P1.subject"));
        assert!(sql.contains("INNER JOIN nodes AS P2_S_V1 ON P2_S_V1.id = P2.subject"));
        assert!(sql.contains("P2.subject = P1.subject"));
        assert!(sql.contains("P1.deleted = "));
        assert!(sql.contains("P2.deleted = "));
        assert!(sql.ends_with(
            "ORDER BY P2_O_V2.dvalue ASC, P2_O_V2.tvalue ASC, P2_O_V2.svalue ASC"
        ));
        assert_eq!(params, vec![1, 2, 0, 3, 0]);
    }

    #[test]
    fn test_compile_without_variables() {
        let query = ResolvedQuery {
            patterns: vec![ResolvedPattern {
                index: 0,
                subject: Slot::Id(1),
                predicate: Slot::Id(2),
                object: Slot::Id(3),
                context: Some(Slot::Id(4)),
            }],
            ..Default::default()
        };
        let compiled = compile(&query);
        assert!(compiled.variables.is_empty());
        assert_eq!(compiled.select.from.len(), 1);

        let (sql, params) = SqliteDialect.render(&compiled.select);
        assert!(sql.contains("P1.context = ?4"));
        assert!(sql.contains("P1.deleted = ?5"));
        assert_eq!(params, vec![1, 2, 3, 4, 0]);
    }

    #[test]
    fn test_compile_bindings_filters_and_justifications() {
        let mut query = person_query();
        query.bindings = vec![("x".into(), 9)];
        query.same_values = vec![("age".into(), 30)];
        query.justifications = true;
        query.limit = Some(5);

        let compiled = compile(&query);
        assert_eq!(compiled.justifications, 2);
        let (sql, params) = SqliteDialect.render(&compiled.select);
        assert!(sql.contains("P1.id AS J1, P2.id AS J2"));
        assert!(sql.ends_with("LIMIT 5"));
        assert_eq!(params[params.len() - 2..], [9, 30]);
    }

    #[test]
    fn test_justifications_follow_caller_order() {
        let mut query = person_query();
        query.patterns.reverse();
        query.justifications = true;

        let compiled = compile(&query);
        let (sql, _) = SqliteDialect.render(&compiled.select);
        // the type pattern was listed first but is compiled as P2
        assert!(sql.contains("P2.id AS J1, P1.id AS J2"));
    }

    #[test]
    fn test_compile_context_variable() {
        let query = ResolvedQuery {
            patterns: vec![ResolvedPattern {
                index: 0,
                subject: var("s"),
                predicate: var("p"),
                object: var("o"),
                context: Some(var("g")),
            }],
            ..Default::default()
        };
        let compiled = compile(&query);
        assert_eq!(compiled.variables, vec!["s", "p", "o", "g"]);
        let (sql, _) = SqliteDialect.render(&compiled.select);
        assert!(sql.contains("P1_C_V4.id = P1.context"));
    }

    #[test]
    fn test_validate() {
        let empty = PatternQuery::default();
        assert!(matches!(validate(&empty), Err(Error::InvalidQuery(_))));

        let pattern = Pattern::new(PatternTerm::var("x"), Node::uri("http://p"), PatternTerm::var("y"));
        let ok = PatternQuery::new(vec![pattern.clone()])
            .filter(Filter::SameTerm("x".into(), "y".into()))
            .order_by("y");
        assert!(validate(&ok).is_ok());

        let regex = PatternQuery::new(vec![pattern.clone()])
            .filter(Filter::Regex("y".into(), "^a".into()));
        assert!(matches!(validate(&regex), Err(Error::UnsupportedFilter(_))));

        let compare = PatternQuery::new(vec![pattern.clone()]).filter(Filter::Compare(
            "y".into(),
            CompareOp::Gt,
            Node::int_literal(1, None),
        ));
        assert!(matches!(validate(&compare), Err(Error::UnsupportedFilter(_))));

        let unknown_order = PatternQuery::new(vec![pattern]).order_by("z");
        assert!(matches!(validate(&unknown_order), Err(Error::InvalidQuery(_))));
    }
}
