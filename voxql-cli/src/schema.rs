use std::io::Write;

use clap::Parser;
use eyre::Context;
use tracing::info;
use voxql::introspect::{fetch_condensed_schema, fetch_schema};

use crate::connect::Connect;

/// Print the schema description the language model gets to see
#[derive(Parser, Debug)]
pub struct ShowSchema {
    #[command(flatten)]
    connect: Connect,

    /// Only list tables and their foreign key relationships.
    #[arg(short, long)]
    condensed: bool,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

impl ShowSchema {
    pub async fn run(&self) -> eyre::Result<()> {
        let profile = self.connect.profile()?;

        let text = if self.condensed {
            let schema = fetch_condensed_schema(&profile)
                .await
                .context("Failed to read database schema")?;

            info!(tables = schema.tables.len(), "Read condensed schema");

            if self.json {
                serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?
            } else {
                schema.to_string()
            }
        } else {
            let schema = fetch_schema(&profile)
                .await
                .context("Failed to read database schema")?;

            info!(tables = schema.len(), "Read schema");

            if self.json {
                serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?
            } else {
                schema.to_string()
            }
        };

        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", text.trim_end()).context("Failed to write output")?;

        Ok(())
    }
}
