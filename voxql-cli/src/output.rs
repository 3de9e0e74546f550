//! Text rendering of result tables and charts.

use std::io::{self, Write};

use itertools::Itertools;
use serde::Serialize;
use voxql::{
    chart::{ChartKind, ChartSeries},
    table::ResultTable,
};

const BAR_WIDTH: f64 = 40.0;
const SPARKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub fn write_json(out: &mut impl Write, value: &impl Serialize) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

/// Aligned columns with a header row.
pub fn write_table(out: &mut impl Write, table: &ResultTable) -> io::Result<()> {
    if table.columns().is_empty() {
        return writeln!(out, "(no columns)");
    }

    let cells = table
        .rows()
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect_vec())
        .collect_vec();

    let widths = table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain([name.chars().count()])
                .max()
                .unwrap_or_default()
        })
        .collect_vec();

    let line = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(value, width)| format!("{value:<width$}"))
            .join(" | ")
            .trim_end()
            .to_owned()
    };

    writeln!(out, "{}", line(table.columns()))?;
    writeln!(out, "{}", widths.iter().map(|e| "-".repeat(*e)).join("-+-"))?;

    for row in &cells {
        writeln!(out, "{}", line(row.as_slice()))?;
    }

    let n = table.len();
    writeln!(out, "({n} row{})", if n == 1 { "" } else { "s" })
}

pub fn write_chart(out: &mut impl Write, kind: ChartKind, series: &ChartSeries) -> io::Result<()> {
    writeln!(out, "{kind} chart of {} by {}", series.y, series.x)?;

    if series.is_empty() {
        return writeln!(out, "(nothing to plot)");
    }

    let label_width = series
        .labels
        .iter()
        .map(|e| e.chars().count())
        .max()
        .unwrap_or_default();

    match kind {
        ChartKind::Bar => {
            let max = series.max_magnitude();

            for (label, value) in series.points() {
                let bar = "█".repeat(scaled(value.abs(), max, BAR_WIDTH));
                writeln!(out, "{label:<label_width$} | {bar} {value}")?;
            }
        }
        ChartKind::Line => {
            writeln!(out, "{}", sparkline(&series.values))?;

            for (label, value) in series.points() {
                writeln!(out, "{label:<label_width$} | {value}")?;
            }
        }
        ChartKind::Pie => {
            for ((label, value), share) in series.points().zip(series.percentages()) {
                writeln!(out, "{label:<label_width$} | {share:>5.1}% ({value})")?;
            }
        }
    }

    Ok(())
}

fn sparkline(values: &[f64]) -> String {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), e| {
            (lo.min(*e), hi.max(*e))
        });

    #[allow(clippy::cast_precision_loss)]
    let top = (SPARKS.len() - 1) as f64;

    values
        .iter()
        .map(|e| SPARKS[scaled(e - min, max - min, top)])
        .collect()
}

/// `value` as a share of `max`, scaled to `0..=steps` and rounded.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled(value: f64, max: f64, steps: f64) -> usize {
    if max <= 0.0 {
        return 0;
    }

    (value / max * steps).round().clamp(0.0, steps) as usize
}
