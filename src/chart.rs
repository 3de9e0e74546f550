use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    table::ResultTable,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Pie,
}

impl FromStr for ChartKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bar" => Ok(Self::Bar),
            "line" => Ok(Self::Line),
            "pie" => Ok(Self::Pie),
            other => Err(Error::Chart(format!(
                "unknown chart kind `{other}`, expected one of bar, line, pie"
            ))),
        }
    }
}

impl Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Pie => "pie",
        })
    }
}

/// Labelled values taken from two columns of a [`ResultTable`].
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub x: String,
    pub y: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl ChartSeries {
    /// Pair every row's `x` cell (as text) with its `y` cell.
    ///
    /// `y` must be one of [`ResultTable::numeric_columns`]. Rows whose `y` cell is `NULL` are
    /// left out, and a table without rows gives an empty series.
    pub fn from_table(table: &ResultTable, x: &str, y: &str) -> Result<Self> {
        let x_index = table
            .column_index(x)
            .ok_or_else(|| missing_column(table, x))?;
        let y_index = table
            .column_index(y)
            .ok_or_else(|| missing_column(table, y))?;

        if table.is_empty() {
            return Ok(Self {
                x: x.to_owned(),
                y: y.to_owned(),
                labels: Vec::new(),
                values: Vec::new(),
            });
        }

        if !table.numeric_columns().contains(&y) {
            return Err(Error::Chart(format!(
                "column `{y}` is not numeric and cannot be plotted"
            )));
        }

        let (labels, values) = table
            .rows()
            .iter()
            .filter_map(|row| {
                row[y_index]
                    .as_f64()
                    .map(|value| (row[x_index].to_string(), value))
            })
            .unzip();

        Ok(Self {
            x: x.to_owned(),
            y: y.to_owned(),
            labels,
            values,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Largest absolute value, or `0.0` for an empty series.
    #[must_use]
    pub fn max_magnitude(&self) -> f64 {
        self.values.iter().fold(0.0, |acc: f64, e| acc.max(e.abs()))
    }

    /// Each value's share of the total in percent, as a pie chart shows it.
    ///
    /// All shares are `0.0` when the values sum to zero.
    #[must_use]
    pub fn percentages(&self) -> Vec<f64> {
        let total: f64 = self.values.iter().sum();

        self.values
            .iter()
            .map(|e| if total == 0.0 { 0.0 } else { e / total * 100.0 })
            .collect()
    }
}

fn missing_column(table: &ResultTable, name: &str) -> Error {
    Error::Chart(format!(
        "no column `{name}` in result, available: {}",
        table.columns().join(", ")
    ))
}
