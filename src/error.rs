use std::time::Duration;

use thiserror::Error;

use crate::model::ModelError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can make a pipeline run fail.
///
/// The `Display` output is meant to be shown to the end user as-is.
#[derive(Debug, Error)]
pub enum Error {
    /// The database could not be reached or opened.
    #[error("connectivity: {0}")]
    Connectivity(String),

    /// The dialect is unsupported, or its configuration is incomplete.
    #[error("dialect: {0}")]
    Dialect(String),

    #[error("synthesis: {0}")]
    Synthesis(#[from] SynthesisError),

    /// The database driver rejected or failed a query. This covers the catalog queries run while
    /// reading the schema, whose messages start with "failed to read database schema".
    #[error("execution: {0}")]
    Execution(String),

    #[error("transcription: {0}")]
    Transcription(String),

    /// The read-only guard refused the query.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("chart: {0}")]
    Chart(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("language model did not answer within {0:?}")]
    TimedOut(Duration),

    #[error("language model returned an empty response")]
    EmptyResponse,

    #[error("language model returned {0} statements, expected exactly one")]
    MultipleStatements(usize),

    #[error("language model did not return a SQL statement: {0}")]
    NotSql(String),
}

impl Error {
    pub(crate) fn connectivity(e: &sqlx::Error) -> Self {
        Self::Connectivity(format!("failed to connect to database: {e}"))
    }

    /// Wrap a driver error raised while running a query, keeping the driver's message.
    pub(crate) fn execution(e: &sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => Self::Execution(db.message().to_owned()),
            other => Self::Execution(other.to_string()),
        }
    }
}

impl From<voxql_sqlparse::db::UnsupportedDialect> for Error {
    fn from(value: voxql_sqlparse::db::UnsupportedDialect) -> Self {
        Self::Dialect(value.to_string())
    }
}
