//! A small SELECT statement model and its rendering.
//!
//! The pattern compiler builds a [`SelectQuery`]; a [`SqlDialect`] turns it
//! into SQL text and a list of bound parameters. Only the constructs the
//! compiler needs are modelled: column projections, tables with inner
//! joins, equality predicates, ordering and a limit.

use std::fmt::Write;

/// A column of an aliased table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub table: String,
    pub name: &'static str,
}

impl Column {
    pub fn new(table: impl Into<String>, name: &'static str) -> Self {
        Self {
            table: table.into(),
            name,
        }
    }
}

/// One side of an equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Column(Column),
    /// A bound integer parameter.
    Param(i64),
}

/// An equality predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub left: Column,
    pub right: Operand,
}

impl Condition {
    pub fn columns(left: Column, right: Column) -> Self {
        Self {
            left,
            right: Operand::Column(right),
        }
    }

    pub fn param(left: Column, value: i64) -> Self {
        Self {
            left,
            right: Operand::Param(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub column: Column,
    pub alias: String,
}

/// `INNER JOIN table AS alias ON ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: &'static str,
    pub alias: String,
    pub on: Vec<Condition>,
}

/// A table in the FROM list with the joins hanging off it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: &'static str,
    pub alias: String,
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: Column,
    pub ascending: bool,
}

/// A SELECT statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    pub projections: Vec<Projection>,
    pub from: Vec<TableRef>,
    pub conditions: Vec<Condition>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<usize>,
}

/// Renders a [`SelectQuery`] for one database engine.
pub trait SqlDialect {
    /// Placeholder for the `index`-th parameter, counting from 1.
    fn placeholder(&self, index: usize) -> String;

    fn quote_identifier(&self, ident: &str) -> String {
        ident.to_string()
    }

    /// Renders the statement. Returns the SQL text and the parameter values
    /// in placeholder order.
    fn render(&self, query: &SelectQuery) -> (String, Vec<i64>) {
        let mut params = Vec::new();
        let mut sql = String::from("SELECT ");

        if query.projections.is_empty() {
            sql.push('1');
        }
        for (i, p) in query.projections.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let _ = write!(
                sql,
                "{} AS {}",
                self.column(&p.column),
                self.quote_identifier(&p.alias)
            );
        }

        sql.push_str("\nFROM ");
        for (i, table) in query.from.iter().enumerate() {
            if i > 0 {
                sql.push_str(",\n     ");
            }
            let _ = write!(sql, "{} AS {}", table.table, self.quote_identifier(&table.alias));
            for join in &table.joins {
                let _ = write!(
                    sql,
                    "\n     INNER JOIN {} AS {} ON ",
                    join.table,
                    self.quote_identifier(&join.alias)
                );
                self.conditions(&mut sql, &join.on, " AND ", &mut params);
            }
        }

        if !query.conditions.is_empty() {
            sql.push_str("\nWHERE ");
            self.conditions(&mut sql, &query.conditions, "\n  AND ", &mut params);
        }

        if !query.order_by.is_empty() {
            sql.push_str("\nORDER BY ");
            for (i, term) in query.order_by.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let dir = if term.ascending { "ASC" } else { "DESC" };
                let _ = write!(sql, "{} {}", self.column(&term.column), dir);
            }
        }

        if let Some(limit) = query.limit {
            let _ = write!(sql, "\nLIMIT {}", limit);
        }
        (sql, params)
    }

    #[doc(hidden)]
    fn column(&self, column: &Column) -> String {
        format!("{}.{}", self.quote_identifier(&column.table), column.name)
    }

    #[doc(hidden)]
    fn conditions(&self, sql: &mut String, conditions: &[Condition], sep: &str, params: &mut Vec<i64>) {
        for (i, cond) in conditions.iter().enumerate() {
            if i > 0 {
                sql.push_str(sep);
            }
            let right = match &cond.right {
                Operand::Column(c) => self.column(c),
                Operand::Param(v) => {
                    params.push(*v);
                    self.placeholder(params.len())
                }
            };
            let _ = write!(sql, "{} = {}", self.column(&cond.left), right);
        }
    }
}

/// SQLite rendering with numbered `?N` placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }
}
