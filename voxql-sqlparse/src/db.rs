use std::{fmt::Display, str::FromStr};

use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use sqlparser::dialect::{Dialect as SqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use thiserror::Error;

/// The database products voxql knows how to talk to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    MySql,
    Postgres,
}

/// Returned when a dialect tag does not name a supported database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported database type `{0}`, expected one of `sqlite`, `mysql` or `postgresql`")]
pub struct UnsupportedDialect(pub String);

impl Dialect {
    /// Guess the dialect from the scheme of a connection string, e.g. `postgres://...`.
    #[must_use]
    pub fn from_connection_string(input: &str) -> Option<Self> {
        let lower = input.to_lowercase();

        if lower.starts_with("postgres") {
            Some(Self::Postgres)
        } else if lower.starts_with("sqlite") {
            Some(Self::Sqlite)
        } else if lower.starts_with("mysql") || lower.starts_with("mariadb") {
            Some(Self::MySql)
        } else {
            None
        }
    }

    /// Human readable product name, as used in prompts.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Sqlite => "SQLite",
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
        }
    }

    /// The `sqlparser` dialect matching this database.
    #[must_use]
    pub fn sql_dialect(self) -> Box<dyn SqlDialect> {
        match self {
            Self::Sqlite => Box::new(SQLiteDialect {}),
            Self::MySql => Box::new(MySqlDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
        }
    }

    #[must_use]
    pub const fn default_port(self) -> Option<u16> {
        match self {
            Self::Sqlite => None,
            Self::MySql => Some(3306),
            Self::Postgres => Some(5432),
        }
    }
}

impl FromStr for Dialect {
    type Err = UnsupportedDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgresql" | "postgres" => Ok(Self::Postgres),
            other => Err(UnsupportedDialect(other.to_string())),
        }
    }
}

impl Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
            Self::Postgres => "postgresql",
        })
    }
}

/// Attempt to retrieve the database URL from the `DATABASE_URL` environment variable, or from a
/// corresponding `.env` file.
///
/// Values that are not valid UTF-8 are ignored.
#[must_use]
pub fn get_database_url() -> Option<String> {
    let _ = dotenv();

    std::env::var("DATABASE_URL").ok()
}

#[cfg(test)]
mod test {
    use super::Dialect;

    #[test]
    fn test_parse_tags() {
        assert_eq!("sqlite".parse::<Dialect>(), Ok(Dialect::Sqlite));
        assert_eq!("MySQL".parse::<Dialect>(), Ok(Dialect::MySql));
        assert_eq!(" postgresql ".parse::<Dialect>(), Ok(Dialect::Postgres));
        assert_eq!("postgres".parse::<Dialect>(), Ok(Dialect::Postgres));

        let err = "oracle".parse::<Dialect>().unwrap_err();
        assert_eq!(err.0, "oracle");
        assert!(err.to_string().contains("oracle"));
    }

    #[test]
    fn test_unsupported_dialect_is_an_error() {
        let err: Box<dyn std::error::Error + Send + Sync> =
            Box::new("db2".parse::<Dialect>().expect_err("db2 is not supported"));

        assert_eq!(
            err.to_string(),
            "unsupported database type `db2`, expected one of `sqlite`, `mysql` or `postgresql`"
        );
    }

    #[test]
    fn test_from_connection_string() {
        assert_eq!(
            Dialect::from_connection_string("postgres://u:p@localhost/db"),
            Some(Dialect::Postgres)
        );
        assert_eq!(
            Dialect::from_connection_string("sqlite://data/dataset.db"),
            Some(Dialect::Sqlite)
        );
        assert_eq!(
            Dialect::from_connection_string("MYSQL://root@localhost/shop"),
            Some(Dialect::MySql)
        );
        assert_eq!(Dialect::from_connection_string("oracle://x"), None);
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for dialect in [Dialect::Sqlite, Dialect::MySql, Dialect::Postgres] {
            assert_eq!(dialect.to_string().parse::<Dialect>(), Ok(dialect));
        }
    }
}
