use std::fmt::Display;

use serde::{Serialize, Serializer, ser::SerializeMap};

/// A single value read from a result row.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl CellValue {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    /// The value as a float, if it is a number.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(e) => Some(*e as f64),
            Self::Float(e) => Some(*e),
            _ => None,
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(e) => write!(f, "{e}"),
            Self::Integer(e) => write!(f, "{e}"),
            Self::Float(e) => write!(f, "{e}"),
            Self::Text(e) => f.write_str(e),
            Self::Bytes(e) => write!(f, "<{} bytes>", e.len()),
        }
    }
}

/// The materialized result of a query: ordered column names and rows of values.
///
/// Serializes as a JSON array of objects whose keys keep the column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl ResultTable {
    #[must_use]
    pub const fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. Rows shorter than the column list are padded with `NULL`, longer ones are
    /// cut.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Null);
        self.rows.push(row);
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|e| e.eq(name))
    }

    /// All values of the column called `name`, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &CellValue>> {
        let index = self.column_index(name)?;

        Some(self.rows.iter().map(move |row| &row[index]))
    }

    #[must_use]
    pub fn row(&self, index: usize) -> Option<RowView<'_>> {
        self.rows.get(index).map(|values| RowView {
            columns: &self.columns,
            values,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = RowView<'_>> {
        self.rows.iter().map(|values| RowView {
            columns: &self.columns,
            values,
        })
    }

    /// Columns usable as a chart's value axis: every non-null cell is a number, and there is at
    /// least one.
    #[must_use]
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let mut values = self.rows.iter().map(|row| &row[*i]).filter(|e| !e.is_null());
                let mut seen = false;

                values.all(|e| {
                    seen = true;
                    e.is_numeric()
                }) && seen
            })
            .map(|(_, name)| name.as_str())
            .collect()
    }
}

/// One row of a [`ResultTable`], viewed as an ordered mapping of column name to value.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    columns: &'a [String],
    values: &'a [CellValue],
}

impl<'a> RowView<'a> {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a CellValue> {
        self.columns
            .iter()
            .position(|e| e.eq(column))
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a CellValue)> + use<'a> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    #[must_use]
    pub const fn values(&self) -> &'a [CellValue] {
        self.values
    }
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl Serialize for ResultTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(test)]
mod test {
    use super::{CellValue, ResultTable};

    fn sales() -> ResultTable {
        let mut table = ResultTable::new(vec![
            "region".to_owned(),
            "total".to_owned(),
            "share".to_owned(),
        ]);
        table.push_row(vec![
            CellValue::Text("north".to_owned()),
            CellValue::Integer(120),
            CellValue::Float(0.4),
        ]);
        table.push_row(vec![
            CellValue::Text("south".to_owned()),
            CellValue::Null,
            CellValue::Float(0.6),
        ]);
        table
    }

    #[test]
    fn test_row_view_keeps_column_order() {
        let table = sales();
        let row = table.row(0).expect("Missing row");

        let names = row.iter().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(names, ["region", "total", "share"]);
        assert_eq!(row.get("total"), Some(&CellValue::Integer(120)));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let mut table = ResultTable::new(vec!["a".to_owned(), "b".to_owned()]);
        table.push_row(vec![CellValue::Integer(1)]);

        assert_eq!(table.rows()[0], [CellValue::Integer(1), CellValue::Null]);
    }

    #[test]
    fn test_numeric_columns() {
        let table = sales();
        assert_eq!(table.numeric_columns(), ["total", "share"]);

        let mut all_null = ResultTable::new(vec!["x".to_owned()]);
        all_null.push_row(vec![CellValue::Null]);
        assert!(all_null.numeric_columns().is_empty());
    }

    #[test]
    fn test_json_is_ordered() {
        let json = serde_json::to_string(&sales()).expect("Failed to serialize");

        assert_eq!(
            json,
            r#"[{"region":"north","total":120,"share":0.4},{"region":"south","total":null,"share":0.6}]"#
        );
    }

    #[test]
    fn test_column_values() {
        let table = sales();
        let regions = table
            .column("region")
            .expect("Missing column")
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        assert_eq!(regions, ["north", "south"]);
        assert!(table.column("nope").is_none());
    }
}
