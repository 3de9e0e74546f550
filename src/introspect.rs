use std::{collections::BTreeMap, fmt::Display};

use futures::{TryStreamExt, future};
use serde::Serialize;
use sqlx::{
    MySqlConnection, PgConnection, Row, SqliteConnection, mysql::MySqlRow, postgres::PgRow,
    sqlite::SqliteRow,
};
use tracing::{debug, info};
use voxql_sqlparse::schema::{CondensedSchema, ForeignKey};

use crate::{
    connection::DbConnection,
    error::{Error, Result},
    profile::ConnectionProfile,
};

/// Table name to table definition, for every base table visible to the connection.
///
/// Iterates in table name order.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct SchemaDescription {
    tables: BTreeMap<String, String>,
}

impl SchemaDescription {
    pub fn insert(&mut self, table: impl Into<String>, definition: impl Into<String>) {
        self.tables.insert(table.into(), definition.into());
    }

    #[must_use]
    pub fn get(&self, table: &str) -> Option<&str> {
        self.tables.get(table).map(String::as_str)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SchemaDescription {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            tables: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The prompt form of the schema, one block per table.
impl Display for SchemaDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (table, definition) in self.iter() {
            writeln!(f, "Schema for table {table}:\n{definition}")?;
        }
        Ok(())
    }
}

/// Open a connection for `profile`, read its schema, and close it again.
pub async fn fetch_schema(profile: &ConnectionProfile) -> Result<SchemaDescription> {
    let mut conn = DbConnection::open(profile).await?;
    let r = conn.fetch_schema().await;
    conn.close().await;
    r
}

/// Open a connection for `profile`, read its table names and foreign keys, and close it again.
pub async fn fetch_condensed_schema(profile: &ConnectionProfile) -> Result<CondensedSchema> {
    let mut conn = DbConnection::open(profile).await?;
    let r = conn.fetch_condensed_schema().await;
    conn.close().await;
    r
}

impl DbConnection {
    pub async fn fetch_schema(&mut self) -> Result<SchemaDescription> {
        let schema = match self {
            Self::Sqlite(conn) => sqlite_schema(conn).await,
            Self::MySql(conn) => mysql_schema(conn).await,
            Self::Postgres(conn) => postgres_schema(conn).await,
        }
        .map_err(|e| introspection_failed(&e))?;

        info!(tables = schema.len(), "fetched database schema");

        Ok(schema)
    }

    pub async fn fetch_condensed_schema(&mut self) -> Result<CondensedSchema> {
        let schema = match self {
            Self::Sqlite(conn) => sqlite_condensed(conn).await,
            Self::MySql(conn) => mysql_condensed(conn).await,
            Self::Postgres(conn) => postgres_condensed(conn).await,
        }
        .map_err(|e| introspection_failed(&e))?;

        info!(
            tables = schema.tables.len(),
            relationships = schema.relationships.len(),
            "fetched condensed database schema"
        );

        Ok(schema)
    }
}

fn introspection_failed(e: &sqlx::Error) -> Error {
    Error::Execution(format!("failed to read database schema: {e}"))
}

const SQLITE_TABLES: &str = "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

async fn sqlite_tables(conn: &mut SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(SQLITE_TABLES)
        .fetch(&mut *conn)
        .try_collect()
        .await
}

async fn sqlite_schema(conn: &mut SqliteConnection) -> Result<SchemaDescription, sqlx::Error> {
    let mut schema = SchemaDescription::default();

    for table in sqlite_tables(conn).await? {
        let sql: Option<String> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&table)
                .fetch_one(&mut *conn)
                .await?;

        debug!(table = %table, "read sqlite table definition");
        schema.insert(table, sql.unwrap_or_default());
    }

    Ok(schema)
}

async fn sqlite_condensed(conn: &mut SqliteConnection) -> Result<CondensedSchema, sqlx::Error> {
    let tables = sqlite_tables(conn).await?;

    let relationships = sqlx::query(
        r#"SELECT m.name AS "table", f."from" AS "column", f."table" AS referenced_table, f."to" AS referenced_column
        FROM sqlite_master m
        CROSS JOIN pragma_foreign_key_list(m.name) f
        WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
        ORDER BY m.name, f.id, f.seq"#,
    )
    .fetch(&mut *conn)
    .and_then(|row| future::ready(sqlite_foreign_key(&row)))
    .try_collect()
    .await?;

    Ok(CondensedSchema {
        tables,
        relationships,
    })
}

fn sqlite_foreign_key(row: &SqliteRow) -> Result<ForeignKey, sqlx::Error> {
    Ok(ForeignKey::new(
        row.try_get::<String, _>("table")?,
        row.try_get::<String, _>("column")?,
        row.try_get::<String, _>("referenced_table")?,
        row.try_get::<Option<String>, _>("referenced_column")?,
    ))
}

/// Read a textual MySQL column, tolerating servers that report it as binary.
fn mysql_text(row: &MySqlRow, index: usize) -> Result<String, sqlx::Error> {
    row.try_get::<String, _>(index).or_else(|_| {
        row.try_get::<Vec<u8>, _>(index)
            .map(|e| String::from_utf8_lossy(&e).into_owned())
    })
}

fn mysql_text_opt(row: &MySqlRow, index: usize) -> Result<Option<String>, sqlx::Error> {
    row.try_get::<Option<String>, _>(index).or_else(|_| {
        row.try_get::<Option<Vec<u8>>, _>(index)
            .map(|e| e.map(|e| String::from_utf8_lossy(&e).into_owned()))
    })
}

async fn mysql_tables(conn: &mut MySqlConnection) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query("SHOW FULL TABLES")
        .fetch_all(&mut *conn)
        .await?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        if mysql_text(row, 1)?.eq_ignore_ascii_case("BASE TABLE") {
            tables.push(mysql_text(row, 0)?);
        }
    }
    tables.sort();

    Ok(tables)
}

async fn mysql_schema(conn: &mut MySqlConnection) -> Result<SchemaDescription, sqlx::Error> {
    let mut schema = SchemaDescription::default();

    for table in mysql_tables(conn).await? {
        let row = sqlx::query(&format!(
            "SHOW CREATE TABLE `{}`",
            table.replace('`', "``")
        ))
        .fetch_one(&mut *conn)
        .await?;

        debug!(table = %table, "read mysql table definition");
        schema.insert(table, mysql_text(&row, 1)?);
    }

    Ok(schema)
}

async fn mysql_condensed(conn: &mut MySqlConnection) -> Result<CondensedSchema, sqlx::Error> {
    let tables = mysql_tables(conn).await?;

    let rows = sqlx::query(
        "SELECT TABLE_NAME, COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = DATABASE()
          AND REFERENCED_TABLE_SCHEMA = DATABASE()
          AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION",
    )
    .fetch_all(&mut *conn)
    .await?;

    let relationships = rows
        .iter()
        .map(|row| {
            Ok(ForeignKey::new(
                mysql_text(row, 0)?,
                mysql_text(row, 1)?,
                mysql_text(row, 2)?,
                mysql_text_opt(row, 3)?,
            ))
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok(CondensedSchema {
        tables,
        relationships,
    })
}

async fn postgres_tables(conn: &mut PgConnection) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT table_name::text FROM information_schema.tables
        WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
        ORDER BY table_name",
    )
    .fetch(&mut *conn)
    .try_collect()
    .await
}

/// Rebuilds a `CREATE TABLE` statement from `pg_attribute`, one column per line in attribute
/// order.
const POSTGRES_TABLE_DEFINITION: &str = r"SELECT 'CREATE TABLE ' || quote_ident($1) || E' (\n'
    || string_agg(
        '  ' || quote_ident(a.attname) || ' ' || format_type(a.atttypid, a.atttypmod)
            || CASE WHEN a.attnotnull THEN ' NOT NULL' ELSE '' END,
        E',\n' ORDER BY a.attnum
    )
    || E'\n);'
FROM pg_attribute a
WHERE a.attrelid = ('public.' || quote_ident($1))::regclass
  AND a.attnum > 0
  AND NOT a.attisdropped";

async fn postgres_schema(conn: &mut PgConnection) -> Result<SchemaDescription, sqlx::Error> {
    let mut schema = SchemaDescription::default();

    for table in postgres_tables(conn).await? {
        let definition: Option<String> = sqlx::query_scalar(POSTGRES_TABLE_DEFINITION)
            .bind(&table)
            .fetch_one(&mut *conn)
            .await?;

        debug!(table = %table, "reconstructed postgres table definition");

        let definition = definition.unwrap_or_else(|| format!("CREATE TABLE {table} ();"));
        schema.insert(table, definition);
    }

    Ok(schema)
}

/// One row per column pair of every foreign key declared on a `public` table. `conkey` and
/// `confkey` are unnested together, so composite keys pair up by position.
const POSTGRES_FOREIGN_KEYS: &str = "SELECT src.relname::text, src_col.attname::text, dst.relname::text, dst_col.attname::text
FROM pg_constraint c
CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(src_attnum, dst_attnum, position)
JOIN pg_class src ON src.oid = c.conrelid
JOIN pg_namespace ns ON ns.oid = src.relnamespace
JOIN pg_class dst ON dst.oid = c.confrelid
JOIN pg_attribute src_col ON src_col.attrelid = c.conrelid AND src_col.attnum = k.src_attnum
JOIN pg_attribute dst_col ON dst_col.attrelid = c.confrelid AND dst_col.attnum = k.dst_attnum
WHERE c.contype = 'f' AND ns.nspname = 'public'
ORDER BY src.relname, c.conname, k.position";

fn postgres_foreign_key(row: &PgRow) -> Result<ForeignKey, sqlx::Error> {
    Ok(ForeignKey::new(
        row.try_get::<String, _>(0)?,
        row.try_get::<String, _>(1)?,
        row.try_get::<String, _>(2)?,
        row.try_get::<Option<String>, _>(3)?,
    ))
}

async fn postgres_condensed(conn: &mut PgConnection) -> Result<CondensedSchema, sqlx::Error> {
    let tables = postgres_tables(conn).await?;

    let relationships = sqlx::query(POSTGRES_FOREIGN_KEYS)
        .fetch(&mut *conn)
        .and_then(|row| future::ready(postgres_foreign_key(&row)))
        .try_collect()
        .await?;

    Ok(CondensedSchema {
        tables,
        relationships,
    })
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use sqlx::{Connection, SqliteConnection, sqlite::SqliteConnectOptions};
    use voxql_sqlparse::schema::{ForeignKey, IMPLICIT_PRIMARY_KEY};

    use super::{SchemaDescription, fetch_condensed_schema, fetch_schema, introspection_failed};
    use crate::{error::Error, profile::ConnectionProfile};

    const CUSTOMERS: &str = "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL)";
    const ORDERS: &str = "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers(id), note_id INTEGER REFERENCES notes)";
    const NOTES: &str = "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)";

    async fn create_db(path: &Path, statements: &[&str]) {
        let mut conn = SqliteConnection::connect_with(
            &SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
        )
        .await
        .expect("Failed to create database");

        for statement in statements {
            sqlx::query(statement)
                .execute(&mut conn)
                .await
                .expect("Failed to run setup statement");
        }

        conn.close().await.expect("Failed to close database");
    }

    #[tokio::test]
    async fn test_sqlite_schema_has_one_entry_per_table() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("shop.db");
        create_db(
            &path,
            &[
                CUSTOMERS,
                NOTES,
                ORDERS,
                "CREATE VIEW big_orders AS SELECT * FROM orders WHERE id > 100",
                // creates the internal `sqlite_sequence` table
                "CREATE TABLE log (id INTEGER PRIMARY KEY AUTOINCREMENT, line TEXT)",
            ],
        )
        .await;

        let schema = fetch_schema(&ConnectionProfile::sqlite(path.to_string_lossy()))
            .await
            .expect("Failed to fetch schema");

        assert_eq!(
            schema.table_names().collect::<Vec<_>>(),
            ["customers", "log", "notes", "orders"]
        );
        assert_eq!(schema.get("customers"), Some(CUSTOMERS));
        assert_eq!(schema.get("orders"), Some(ORDERS));
        assert_eq!(schema.get("big_orders"), None);
    }

    #[tokio::test]
    async fn test_sqlite_condensed_schema_lists_foreign_keys() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("shop.db");
        create_db(&path, &[CUSTOMERS, NOTES, ORDERS]).await;

        let condensed = fetch_condensed_schema(&ConnectionProfile::sqlite(path.to_string_lossy()))
            .await
            .expect("Failed to fetch condensed schema");

        assert_eq!(condensed.tables, ["customers", "notes", "orders"]);
        assert!(condensed.relationships.contains(&ForeignKey::new(
            "orders",
            "customer_id",
            "customers",
            Some("id".to_owned())
        )));
        assert!(condensed.relationships.iter().any(|e| e.table == "orders"
            && e.column == "note_id"
            && e.referenced_table == "notes"
            && e.referenced_column == IMPLICIT_PRIMARY_KEY));
        assert_eq!(condensed.relationships.len(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_composite_foreign_key_pairs_by_position() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("shipping.db");
        create_db(
            &path,
            &[
                "CREATE TABLE depots (region TEXT, code INTEGER, PRIMARY KEY (region, code))",
                "CREATE TABLE parcels (id INTEGER PRIMARY KEY, depot_region TEXT, depot_code INTEGER, FOREIGN KEY (depot_region, depot_code) REFERENCES depots(region, code))",
            ],
        )
        .await;

        let condensed = fetch_condensed_schema(&ConnectionProfile::sqlite(path.to_string_lossy()))
            .await
            .expect("Failed to fetch condensed schema");

        assert_eq!(
            condensed.relationships,
            [
                ForeignKey::new("parcels", "depot_region", "depots", Some("region".to_owned())),
                ForeignKey::new("parcels", "depot_code", "depots", Some("code".to_owned())),
            ]
        );
    }

    /// Runs against the server in `VOXQL_TEST_POSTGRES_URL`, and is skipped when it is unset.
    #[tokio::test]
    async fn test_postgres_composite_foreign_key_pairs_by_position() {
        let Ok(url) = std::env::var("VOXQL_TEST_POSTGRES_URL") else {
            return;
        };

        let mut conn = sqlx::PgConnection::connect(&url)
            .await
            .expect("Failed to connect to postgres");

        for statement in [
            "DROP TABLE IF EXISTS voxql_parcels, voxql_depots",
            "CREATE TABLE voxql_depots (region TEXT, code INTEGER, PRIMARY KEY (region, code))",
            "CREATE TABLE voxql_parcels (id INTEGER PRIMARY KEY, depot_region TEXT, depot_code INTEGER, FOREIGN KEY (depot_region, depot_code) REFERENCES voxql_depots(region, code))",
        ] {
            sqlx::query(statement)
                .execute(&mut conn)
                .await
                .expect("Failed to run setup statement");
        }

        let condensed = fetch_condensed_schema(
            &ConnectionProfile::from_url(&url).expect("Failed to build profile"),
        )
        .await
        .expect("Failed to fetch condensed schema");

        sqlx::query("DROP TABLE voxql_parcels, voxql_depots")
            .execute(&mut conn)
            .await
            .expect("Failed to clean up");
        conn.close().await.expect("Failed to close connection");

        assert_eq!(
            condensed.relationships_of("voxql_parcels").cloned().collect::<Vec<_>>(),
            [
                ForeignKey::new(
                    "voxql_parcels",
                    "depot_region",
                    "voxql_depots",
                    Some("region".to_owned())
                ),
                ForeignKey::new(
                    "voxql_parcels",
                    "depot_code",
                    "voxql_depots",
                    Some("code".to_owned())
                ),
            ]
        );
    }

    #[test]
    fn test_schema_read_failure_is_execution_error() {
        let err = introspection_failed(&sqlx::Error::RowNotFound);

        assert!(matches!(err, Error::Execution(_)));
        assert!(
            err.to_string()
                .starts_with("execution: failed to read database schema:")
        );
    }

    #[tokio::test]
    async fn test_empty_database() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("empty.db");
        create_db(&path, &[]).await;

        let schema = fetch_schema(&ConnectionProfile::sqlite(path.to_string_lossy()))
            .await
            .expect("Failed to fetch schema");

        assert!(schema.is_empty());
    }

    #[test]
    fn test_prompt_rendering() {
        let schema = [("b", "CREATE TABLE b (x INT)"), ("a", "CREATE TABLE a (y INT)")]
            .into_iter()
            .collect::<SchemaDescription>();

        assert_eq!(
            schema.to_string(),
            "Schema for table a:\nCREATE TABLE a (y INT)\nSchema for table b:\nCREATE TABLE b (x INT)\n"
        );
    }
}
