use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Column label used when a foreign key references the parent table's primary key implicitly,
/// i.e. without naming a column (`REFERENCES parent`).
pub const IMPLICIT_PRIMARY_KEY: &str = "<primary key>";

/// A single-column foreign key relationship: `table.column -> referenced_table.referenced_column`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

impl ForeignKey {
    /// Build a foreign key, falling back to [`IMPLICIT_PRIMARY_KEY`] when the driver does not
    /// report a referenced column.
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: Option<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| IMPLICIT_PRIMARY_KEY.to_owned()),
        }
    }
}

impl Display for ForeignKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.table, self.column, self.referenced_table, self.referenced_column
        )
    }
}

/// The lightweight form of a schema: which tables exist, and how they reference each other.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CondensedSchema {
    pub tables: Vec<String>,
    pub relationships: Vec<ForeignKey>,
}

impl CondensedSchema {
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|e| e.eq(name))
    }

    /// All relationships whose referencing side is `table`.
    pub fn relationships_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ForeignKey> {
        self.relationships.iter().filter(move |e| e.table.eq(table))
    }
}

impl Display for CondensedSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tables: {}", self.tables.join(", "))?;

        if self.relationships.is_empty() {
            return writeln!(f, "Relationships: none");
        }

        writeln!(f, "Relationships:")?;
        for relationship in &self.relationships {
            writeln!(f, "  {relationship}")?;
        }

        Ok(())
    }
}
