//! One request from start to finish: schema introspection, query synthesis and execution, on a
//! single connection owned by the run.

use serde::Serialize;
use tracing::{Instrument, debug, info, info_span, warn};
use voxql_sqlparse::guard::check_read_only;

use crate::{
    connection::DbConnection,
    error::{Error, Result},
    introspect::SchemaDescription,
    model::{AudioClip, CallOptions, ChatModel, Transcriber},
    profile::ConnectionProfile,
    synthesize::QuerySynthesizer,
    table::ResultTable,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Refuse queries that are not plainly read-only before they reach the database.
    pub read_only: bool,
    /// Limits applied to every language model and transcription call.
    pub call: CallOptions,
}

/// Everything a run produced, in the order it was produced.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub request: String,
    #[serde(skip)]
    pub schema: SchemaDescription,
    pub sql: String,
    pub table: ResultTable,
}

#[derive(Debug, Clone)]
pub struct Pipeline<M> {
    profile: ConnectionProfile,
    synthesizer: QuerySynthesizer<M>,
    options: PipelineOptions,
}

impl<M: ChatModel> Pipeline<M> {
    pub fn new(profile: ConnectionProfile, model: M, options: PipelineOptions) -> Self {
        Self {
            profile,
            synthesizer: QuerySynthesizer::new(model).with_options(options.call),
            options,
        }
    }

    pub const fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    pub const fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Answer a natural-language `request` with a result table.
    pub async fn run(&self, request: &str) -> Result<PipelineOutcome> {
        let span = info_span!("pipeline", dialect = %self.profile.dialect());

        self.run_inner(request).instrument(span).await
    }

    /// Transcribe `clip` with `transcriber`, then [`run`](Self::run) the transcription.
    pub async fn run_audio<T: Transcriber>(
        &self,
        transcriber: &T,
        clip: &AudioClip,
    ) -> Result<PipelineOutcome> {
        let transcription = transcriber.transcribe(clip, &self.options.call);

        let request = match self.options.call.timeout {
            Some(timeout) => tokio::time::timeout(timeout, transcription)
                .await
                .map_err(|_| {
                    Error::Transcription(format!("no transcription within {timeout:?}"))
                })?,
            None => transcription.await,
        }
        .map_err(|e| Error::Transcription(e.to_string()))?;

        info!(transcription = %request, "transcribed audio");

        if request.trim().is_empty() {
            return Err(Error::Transcription("no speech recognized".to_owned()));
        }

        self.run(&request).await
    }

    async fn run_inner(&self, request: &str) -> Result<PipelineOutcome> {
        let mut conn = DbConnection::open(&self.profile).await?;

        let r = self.run_on(&mut conn, request).await;

        conn.close().await;

        r
    }

    async fn run_on(&self, conn: &mut DbConnection, request: &str) -> Result<PipelineOutcome> {
        let dialect = conn.dialect();

        let schema = conn.fetch_schema().await?;

        if schema.is_empty() {
            warn!("database has no tables, the generated query is unlikely to work");
        }

        let sql = self
            .synthesizer
            .synthesize_sql(&schema, request, dialect)
            .await?
            .into_inner();

        if self.options.read_only {
            let verdict = check_read_only(&sql, dialect);

            if !verdict.is_allowed() {
                return Err(Error::Rejected(verdict.describe()));
            }

            debug!("query passed the read-only check");
        }

        let table = conn.execute(&sql).await?;

        info!(
            columns = table.columns().len(),
            rows = table.len(),
            "executed query"
        );

        Ok(PipelineOutcome {
            request: request.to_owned(),
            schema,
            sql,
            table,
        })
    }
}
