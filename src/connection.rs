use std::str::FromStr;

use sqlx::{
    Connection, MySqlConnection, PgConnection, SqliteConnection,
    mysql::MySqlConnectOptions, postgres::PgConnectOptions, sqlite::SqliteConnectOptions,
};
use tracing::debug;
use voxql_sqlparse::db::Dialect;

use crate::{
    error::{Error, Result},
    profile::ConnectionProfile,
};

/// A live connection to one of the supported databases.
///
/// Owned by a single pipeline run and closed at its end.
pub enum DbConnection {
    Sqlite(SqliteConnection),
    MySql(MySqlConnection),
    Postgres(PgConnection),
}

impl DbConnection {
    /// Open a connection as described by `profile`.
    ///
    /// SQLite files are never created; a missing file is a connectivity error.
    pub async fn open(profile: &ConnectionProfile) -> Result<Self> {
        debug!(dialect = %profile.dialect(), "opening database connection");

        let conn = match profile.dialect() {
            Dialect::Sqlite => {
                let options = match profile.url() {
                    Some(url) => SqliteConnectOptions::from_str(url).map_err(bad_url)?,
                    None => SqliteConnectOptions::new().filename(profile.database()),
                };

                Self::Sqlite(
                    SqliteConnection::connect_with(&options.create_if_missing(false))
                        .await
                        .map_err(|e| Error::connectivity(&e))?,
                )
            }
            Dialect::MySql => {
                let options = match profile.url() {
                    Some(url) => MySqlConnectOptions::from_str(url).map_err(bad_url)?,
                    None => {
                        let mut options = MySqlConnectOptions::new().database(profile.database());
                        if let Some(host) = profile.host() {
                            options = options.host(host);
                        }
                        if let Some(port) = profile.port() {
                            options = options.port(port);
                        }
                        if let Some(user) = profile.user() {
                            options = options.username(user);
                        }
                        if let Some(password) = profile.password() {
                            options = options.password(password);
                        }
                        options
                    }
                };

                Self::MySql(
                    MySqlConnection::connect_with(&options)
                        .await
                        .map_err(|e| Error::connectivity(&e))?,
                )
            }
            Dialect::Postgres => {
                let options = match profile.url() {
                    Some(url) => PgConnectOptions::from_str(url).map_err(bad_url)?,
                    None => {
                        let mut options = PgConnectOptions::new().database(profile.database());
                        if let Some(host) = profile.host() {
                            options = options.host(host);
                        }
                        if let Some(port) = profile.port() {
                            options = options.port(port);
                        }
                        if let Some(user) = profile.user() {
                            options = options.username(user);
                        }
                        if let Some(password) = profile.password() {
                            options = options.password(password);
                        }
                        options
                    }
                };

                Self::Postgres(
                    PgConnection::connect_with(&options)
                        .await
                        .map_err(|e| Error::connectivity(&e))?,
                )
            }
        };

        Ok(conn)
    }

    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        match self {
            Self::Sqlite(_) => Dialect::Sqlite,
            Self::MySql(_) => Dialect::MySql,
            Self::Postgres(_) => Dialect::Postgres,
        }
    }

    /// Close the connection gracefully. Failing to do so cleanly is only logged.
    pub async fn close(self) {
        let r = match self {
            Self::Sqlite(conn) => conn.close().await,
            Self::MySql(conn) => conn.close().await,
            Self::Postgres(conn) => conn.close().await,
        };

        if let Err(e) = r {
            debug!("failed to close database connection cleanly: {e}");
        }
    }
}

fn bad_url(e: sqlx::Error) -> Error {
    Error::Dialect(format!("invalid connection string: {e}"))
}
