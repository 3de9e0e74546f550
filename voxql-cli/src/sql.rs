use clap::Parser;
use eyre::Context;
use voxql::execute::execute;

use crate::{connect::Connect, output};

/// Run a query directly, without a language model
#[derive(Parser, Debug)]
pub struct RunSql {
    #[command(flatten)]
    connect: Connect,

    /// The query to run, passed to the database as-is.
    query: String,

    /// Print the rows as JSON instead of a text table.
    #[arg(long)]
    json: bool,
}

impl RunSql {
    pub async fn run(&self) -> eyre::Result<()> {
        let profile = self.connect.profile()?;

        let table = execute(&profile, &self.query)
            .await
            .context("Failed to run query")?;

        let mut out = std::io::stdout().lock();

        if self.json {
            output::write_json(&mut out, &table)
        } else {
            output::write_table(&mut out, &table)
        }
        .context("Failed to write output")
    }
}
