//! Opt-in read-only check for model generated SQL.
//!
//! Allowed: plain queries (without `SELECT ... INTO` and without data modifying CTEs), `EXPLAIN`
//! of an allowed statement, `DESCRIBE` and `SHOW ...`. Everything else is denied, including
//! text that cannot be parsed, since its effect cannot be verified.

use serde::Serialize;
use sqlparser::ast::{Query, SetExpr, Statement};

use crate::{db::Dialect, statement::parse_statements};

/// A single reason why a query was denied.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub statement_index: usize,
    pub detail: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub enum ReadOnlyVerdict {
    Allowed,
    Denied(Vec<Denial>),
}

impl ReadOnlyVerdict {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Denial reasons joined into a single line, empty when allowed.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Allowed => String::new(),
            Self::Denied(denials) => denials
                .iter()
                .map(|e| format!("statement {}: {}", e.statement_index + 1, e.detail))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// Check that every statement in `sql` only reads data.
pub fn check_read_only(sql: &str, dialect: Dialect) -> ReadOnlyVerdict {
    let statements = match parse_statements(sql, dialect) {
        Ok(e) => e,
        Err(e) => {
            return ReadOnlyVerdict::Denied(vec![Denial {
                statement_index: 0,
                detail: format!("cannot verify query, failed to parse it: {e}"),
            }]);
        }
    };

    if statements.is_empty() {
        return ReadOnlyVerdict::Denied(vec![Denial {
            statement_index: 0,
            detail: "query contains no statement".to_owned(),
        }]);
    }

    let denials = statements
        .iter()
        .enumerate()
        .filter(|(_, stmt)| !is_read_only_statement(stmt))
        .map(|(i, stmt)| Denial {
            statement_index: i,
            detail: describe_denial(stmt),
        })
        .collect::<Vec<_>>();

    if denials.is_empty() {
        ReadOnlyVerdict::Allowed
    } else {
        ReadOnlyVerdict::Denied(denials)
    }
}

fn is_read_only_statement(stmt: &Statement) -> bool {
    match stmt {
        Statement::Query(query) => is_read_only_query(query),
        Statement::Explain { statement, .. } => is_read_only_statement(statement),
        Statement::ExplainTable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowVariable { .. } => true,
        _ => false,
    }
}

fn is_read_only_query(query: &Query) -> bool {
    let ctes_read_only = query
        .with
        .as_ref()
        .is_none_or(|with| with.cte_tables.iter().all(|e| is_read_only_query(&e.query)));

    ctes_read_only && is_read_only_body(&query.body)
}

fn is_read_only_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_read_only_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            is_read_only_body(left) && is_read_only_body(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

fn describe_denial(stmt: &Statement) -> String {
    match stmt {
        Statement::Query(query) if has_select_into(&query.body) => {
            "SELECT INTO would create a table".to_owned()
        }
        Statement::Query(_) => "query contains a data modifying clause".to_owned(),
        other => {
            let rendered = other.to_string();
            let keyword = rendered.split_whitespace().next().unwrap_or("unknown");

            format!("{} statements may modify the database", keyword.to_uppercase())
        }
    }
}

fn has_select_into(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::Query(query) => has_select_into(&query.body),
        SetExpr::SetOperation { left, right, .. } => has_select_into(left) || has_select_into(right),
        _ => false,
    }
}
