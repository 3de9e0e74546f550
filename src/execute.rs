use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{
    Column, ColumnIndex, Executor, Row, TypeInfo, ValueRef, mysql::MySqlRow, postgres::PgRow,
    sqlite::SqliteRow, types::Decimal,
};
use tracing::{debug, info};

use crate::{
    connection::DbConnection,
    error::{Error, Result},
    profile::ConnectionProfile,
    table::{CellValue, ResultTable},
};

/// Open a connection for `profile`, run `sql` on it, and close it again.
///
/// The query is passed to the driver untouched, and runs without a timeout.
pub async fn execute(profile: &ConnectionProfile, sql: &str) -> Result<ResultTable> {
    let mut conn = DbConnection::open(profile).await?;
    let r = conn.execute(sql).await;
    conn.close().await;
    r
}

/// Fetch every row of `$sql` on the concrete connection `$conn`.
///
/// Empty results take their column names from `Executor::describe`. It is `#[doc(hidden)]` in
/// sqlx, which builds its `query!` macros on it, so it may change in a minor release.
macro_rules! fetch_table {
    ($conn:expr, $sql:expr) => {
        match sqlx::query($sql).fetch_all(&mut *$conn).await {
            Ok(rows) if rows.is_empty() => $conn
                .describe($sql)
                .await
                .map(|e| ResultTable::new(column_names(e.columns()))),
            Ok(rows) => materialize(&rows),
            Err(e) => Err(e),
        }
    };
}

impl DbConnection {
    /// Run `sql` and materialize every returned row.
    pub async fn execute(&mut self, sql: &str) -> Result<ResultTable> {
        debug!(sql, "executing query");

        let table = match self {
            Self::Sqlite(conn) => fetch_table!(conn, sql),
            Self::MySql(conn) => fetch_table!(conn, sql),
            Self::Postgres(conn) => fetch_table!(conn, sql),
        }
        .map_err(|e| Error::execution(&e))?;

        info!(
            columns = table.columns().len(),
            rows = table.len(),
            "query executed"
        );

        Ok(table)
    }
}

/// Per-driver conversion of a single cell into a [`CellValue`].
trait DecodeCell: Row {
    fn decode_cell(&self, index: usize) -> Result<CellValue, sqlx::Error>;
}

fn materialize<R: DecodeCell>(rows: &[R]) -> Result<ResultTable, sqlx::Error> {
    let Some(first) = rows.first() else {
        return Ok(ResultTable::default());
    };

    let mut table = ResultTable::new(column_names(first.columns()));

    for row in rows {
        table.push_row(
            (0..row.len())
                .map(|i| row.decode_cell(i))
                .collect::<Result<Vec<_>, _>>()?,
        );
    }

    Ok(table)
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|e| e.name().to_owned()).collect()
}

/// Null check plus the name of the value's type, as reported by the driver.
fn raw_type<R: Row>(row: &R, index: usize) -> Result<Option<String>, sqlx::Error>
where
    usize: ColumnIndex<R>,
{
    let raw = row.try_get_raw(index)?;

    if raw.is_null() {
        return Ok(None);
    }

    Ok(Some(raw.type_info().name().to_uppercase()))
}

fn unsupported<R: Row>(row: &R, index: usize, type_name: &str) -> sqlx::Error {
    let column = row
        .columns()
        .get(index)
        .map_or_else(|| index.to_string(), |e| e.name().to_owned());

    sqlx::Error::Decode(
        format!("column `{column}` has unsupported type {type_name}, cast it to text in the query")
            .into(),
    )
}

fn decimal(value: Decimal) -> CellValue {
    let text = value.to_string();

    text.parse::<f64>()
        .map_or(CellValue::Text(text), CellValue::Float)
}

#[allow(clippy::cast_precision_loss)]
fn unsigned(value: u64) -> CellValue {
    i64::try_from(value).map_or(CellValue::Float(value as f64), CellValue::Integer)
}

impl DecodeCell for SqliteRow {
    fn decode_cell(&self, index: usize) -> Result<CellValue, sqlx::Error> {
        let Some(type_name) = raw_type(self, index)? else {
            return Ok(CellValue::Null);
        };

        Ok(match type_name.as_str() {
            "INTEGER" => CellValue::Integer(self.try_get_unchecked(index)?),
            "REAL" | "NUMERIC" => CellValue::Float(self.try_get_unchecked(index)?),
            "BOOLEAN" => CellValue::Bool(self.try_get_unchecked(index)?),
            "TEXT" | "DATE" | "TIME" | "DATETIME" => {
                CellValue::Text(self.try_get_unchecked(index)?)
            }
            "BLOB" => CellValue::Bytes(self.try_get_unchecked(index)?),
            other => return Err(unsupported(self, index, other)),
        })
    }
}

impl DecodeCell for MySqlRow {
    fn decode_cell(&self, index: usize) -> Result<CellValue, sqlx::Error> {
        let Some(type_name) = raw_type(self, index)? else {
            return Ok(CellValue::Null);
        };

        if type_name.ends_with(" UNSIGNED") {
            return Ok(unsigned(self.try_get_unchecked(index)?));
        }

        Ok(match type_name.as_str() {
            "BOOLEAN" => CellValue::Bool(self.try_get_unchecked(index)?),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
                CellValue::Integer(self.try_get_unchecked(index)?)
            }
            "FLOAT" => CellValue::Float(f64::from(self.try_get_unchecked::<f32, _>(index)?)),
            "DOUBLE" => CellValue::Float(self.try_get_unchecked(index)?),
            "DECIMAL" => decimal(self.try_get_unchecked(index)?),
            "DATE" => CellValue::Text(self.try_get_unchecked::<NaiveDate, _>(index)?.to_string()),
            "TIME" => CellValue::Text(self.try_get_unchecked::<NaiveTime, _>(index)?.to_string()),
            "DATETIME" => {
                CellValue::Text(self.try_get_unchecked::<NaiveDateTime, _>(index)?.to_string())
            }
            "TIMESTAMP" => CellValue::Text(
                self.try_get_unchecked::<DateTime<Utc>, _>(index)?
                    .to_rfc3339(),
            ),
            "JSON" => CellValue::Text(
                self.try_get_unchecked::<serde_json::Value, _>(index)?
                    .to_string(),
            ),
            "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
            | "SET" => CellValue::Text(self.try_get_unchecked(index)?),
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => CellValue::Bytes(self.try_get_unchecked(index)?),
            other => return Err(unsupported(self, index, other)),
        })
    }
}

impl DecodeCell for PgRow {
    fn decode_cell(&self, index: usize) -> Result<CellValue, sqlx::Error> {
        let Some(type_name) = raw_type(self, index)? else {
            return Ok(CellValue::Null);
        };

        Ok(match type_name.as_str() {
            "BOOL" => CellValue::Bool(self.try_get(index)?),
            "INT2" => CellValue::Integer(self.try_get::<i16, _>(index)?.into()),
            "INT4" => CellValue::Integer(self.try_get::<i32, _>(index)?.into()),
            "INT8" => CellValue::Integer(self.try_get(index)?),
            "FLOAT4" => CellValue::Float(self.try_get::<f32, _>(index)?.into()),
            "FLOAT8" => CellValue::Float(self.try_get(index)?),
            "NUMERIC" => decimal(self.try_get(index)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
                CellValue::Text(self.try_get_unchecked(index)?)
            }
            "DATE" => CellValue::Text(self.try_get::<NaiveDate, _>(index)?.to_string()),
            "TIME" => CellValue::Text(self.try_get::<NaiveTime, _>(index)?.to_string()),
            "TIMESTAMP" => CellValue::Text(self.try_get::<NaiveDateTime, _>(index)?.to_string()),
            "TIMESTAMPTZ" => {
                CellValue::Text(self.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339())
            }
            "JSON" | "JSONB" => {
                CellValue::Text(self.try_get::<serde_json::Value, _>(index)?.to_string())
            }
            "BYTEA" => CellValue::Bytes(self.try_get(index)?),
            other => return Err(unsupported(self, index, other)),
        })
    }
}
