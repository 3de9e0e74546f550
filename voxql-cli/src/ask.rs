use std::{io::Write, path::PathBuf, time::Duration};

use clap::Parser;
use eyre::{Context, eyre};
use serde::Serialize;
use tracing::info;
use voxql::{
    chart::{ChartKind, ChartSeries},
    model::{AudioClip, CallOptions},
    openai::{DEFAULT_API_BASE, DEFAULT_CHAT_MODEL, OpenAiChat, OpenAiConfig, OpenAiTranscriber},
    pipeline::{Pipeline, PipelineOptions, PipelineOutcome},
    table::ResultTable,
};

use crate::{connect::Connect, output};

/// Ask a question in plain language, typed or recorded, and print the answer
#[derive(Parser, Debug)]
pub struct Ask {
    #[command(flatten)]
    connect: Connect,

    /// The question, e.g. "total sales per region". Required unless `--audio` is given.
    #[arg(required_unless_present = "audio")]
    text: Option<String>,

    /// An audio recording of the question, transcribed before anything else happens.
    #[arg(short, long, value_name = "FILE", conflicts_with = "text")]
    audio: Option<PathBuf>,

    /// Refuse to run the generated query unless it only reads data.
    #[arg(long)]
    read_only: bool,

    /// Plot the result instead of printing it as a table.
    #[arg(long, value_name = "bar|line|pie")]
    chart: Option<ChartKind>,

    /// Column used for chart labels. Defaults to the first column.
    #[arg(long, requires = "chart")]
    x: Option<String>,

    /// Numeric column used for chart values. Defaults to the first numeric column.
    #[arg(long, requires = "chart")]
    y: Option<String>,

    /// Print request, query and rows as JSON.
    #[arg(long)]
    json: bool,

    /// Credential for the language model service.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: String,

    /// Chat model used to write the query.
    #[arg(long, env = "VOXQL_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    model: String,

    /// Base URL of an OpenAI compatible API.
    #[arg(long, env = "VOXQL_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Give up on a language model or transcription call after this many seconds.
    #[arg(long, env = "VOXQL_TIMEOUT_SECS", value_name = "SECONDS")]
    timeout: Option<u64>,
}

#[derive(Serialize)]
struct AskOutput<'a> {
    #[serde(flatten)]
    outcome: &'a PipelineOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    chart: Option<&'a ChartSeries>,
}

impl Ask {
    pub async fn run(&self) -> eyre::Result<()> {
        let profile = self.connect.profile()?;

        let config = OpenAiConfig::new(&self.api_key)
            .with_base_url(&self.api_base)
            .with_chat_model(&self.model);

        let options = PipelineOptions {
            read_only: self.read_only,
            call: self
                .timeout
                .map(|e| CallOptions::with_timeout(Duration::from_secs(e)))
                .unwrap_or_default(),
        };

        let pipeline = Pipeline::new(profile, OpenAiChat::new(config.clone()), options);

        let outcome = match (&self.audio, &self.text) {
            (Some(path), _) => {
                let clip = AudioClip::from_file(path)
                    .await
                    .with_context(|| format!("Failed to read audio file {}", path.display()))?;

                pipeline
                    .run_audio(&OpenAiTranscriber::new(config), &clip)
                    .await
            }
            (None, Some(text)) => pipeline.run(text).await,
            (None, None) => return Err(eyre!("Missing question, pass it as text or via --audio")),
        }
        .context("Failed to answer question")?;

        let chart = self
            .chart
            .map(|kind| self.chart_series(&outcome.table).map(|e| (kind, e)))
            .transpose()?;

        let mut out = std::io::stdout().lock();

        if self.json {
            return output::write_json(
                &mut out,
                &AskOutput {
                    outcome: &outcome,
                    chart: chart.as_ref().map(|(_, e)| e),
                },
            )
            .context("Failed to write output");
        }

        info!(sql = %outcome.sql, "Answered question");

        writeln!(out, "Request: {}", outcome.request)?;
        writeln!(out, "SQL: {}\n", outcome.sql)?;

        match &chart {
            Some((kind, series)) => output::write_chart(&mut out, *kind, series),
            None => output::write_table(&mut out, &outcome.table),
        }
        .context("Failed to write output")
    }

    fn chart_series(&self, table: &ResultTable) -> eyre::Result<ChartSeries> {
        let x = match &self.x {
            Some(e) => e.as_str(),
            None => table
                .columns()
                .first()
                .map(String::as_str)
                .ok_or_else(|| eyre!("Query returned no columns to plot"))?,
        };

        let y = match &self.y {
            Some(e) => e.as_str(),
            None => table
                .numeric_columns()
                .into_iter()
                .find(|e| *e != x)
                .or_else(|| table.is_empty().then_some(x))
                .ok_or_else(|| eyre!("Query returned no numeric column to plot, pick one with --y"))?,
        };

        ChartSeries::from_table(table, x, y).context("Failed to prepare chart")
    }
}
