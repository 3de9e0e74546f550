use sqlparser::{
    ast::Statement,
    parser::{Parser, ParserError},
    tokenizer::{Token, Tokenizer},
};

use crate::db::Dialect;

/// Words a bare SQL statement may start with. Anything else at the start of a response that
/// `sqlparser` cannot handle is treated as prose.
const LEADING_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "VALUES", "TABLE", "SHOW", "EXPLAIN", "DESCRIBE", "DESC", "PRAGMA",
    "INSERT", "UPDATE", "DELETE", "REPLACE", "MERGE", "CREATE", "ALTER", "DROP", "TRUNCATE",
    "CALL", "EXEC", "EXECUTE", "(",
];

/// Parse `sql` into its statements using the grammar of `dialect`.
pub fn parse_statements(sql: &str, dialect: Dialect) -> Result<Vec<Statement>, ParserError> {
    Parser::parse_sql(dialect.sql_dialect().as_ref(), sql)
}

/// Outcome of inspecting a piece of text that is supposed to hold exactly one SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementShape {
    /// Parsed to exactly one statement.
    Single,
    /// Parsed to zero or more than one statement.
    Multiple(usize),
    /// Could not be parsed, but starts like SQL and holds a single statement; the database gets
    /// the final say.
    Unparsed,
    /// Could not be parsed and does not start with a SQL keyword, or cannot even be tokenized.
    NotSql,
}

/// Classify `sql` for the response policy applied to model output.
///
/// Text the parser rejects is still split into statements on the token level, so statements
/// separated by `;` are counted even when one of them uses syntax `sqlparser` does not know.
pub fn statement_shape(sql: &str, dialect: Dialect) -> StatementShape {
    match parse_statements(sql, dialect) {
        Ok(statements) if statements.len() == 1 => StatementShape::Single,
        Ok(statements) => StatementShape::Multiple(statements.len()),
        Err(_) if !starts_with_sql_keyword(sql) => StatementShape::NotSql,
        Err(_) => match count_statement_tokens(sql, dialect) {
            Some(1) => StatementShape::Unparsed,
            Some(n) => StatementShape::Multiple(n),
            None => StatementShape::NotSql,
        },
    }
}

/// Number of non-empty `;` separated token runs in `sql`, or `None` if it cannot be tokenized.
///
/// Semicolons inside string literals, quoted identifiers and comments are part of their token
/// and do not split.
pub fn count_statement_tokens(sql: &str, dialect: Dialect) -> Option<usize> {
    let tokens = Tokenizer::new(dialect.sql_dialect().as_ref(), sql)
        .tokenize()
        .ok()?;

    let count = tokens
        .split(|e| matches!(e, Token::SemiColon))
        .filter(|run| {
            run.iter()
                .any(|e| !matches!(e, Token::Whitespace(_) | Token::EOF))
        })
        .count();

    Some(count)
}

/// Whether the first word of `text` is a word a SQL statement may start with.
pub fn starts_with_sql_keyword(text: &str) -> bool {
    let text = text.trim_start();

    if text.starts_with('(') {
        return true;
    }

    let first = text
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_uppercase();

    LEADING_KEYWORDS.contains(&first.as_str())
}
