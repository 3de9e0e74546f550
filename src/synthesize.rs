use std::fmt::Display;

use tracing::{debug, info};
use voxql_sqlparse::{
    db::Dialect,
    statement::{StatementShape, statement_shape},
};

use crate::{
    error::{Result, SynthesisError},
    introspect::SchemaDescription,
    model::{CallOptions, ChatMessage, ChatModel},
};

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant skilled in databases and language processing.";

/// Words a model tends to echo in front of the statement, either as a code fence info string or
/// as a bare first word.
const ECHOED_KEYWORDS: &[&str] = &["sql", "sqlite", "mysql", "postgresql", "postgres", "psql"];

/// SQL produced by the language model. It is only checked for shape (one statement, not prose),
/// never for meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery(String);

impl CandidateQuery {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for CandidateQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CandidateQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Turns a natural-language request into a [`CandidateQuery`] using a [`ChatModel`].
#[derive(Debug, Clone)]
pub struct QuerySynthesizer<M> {
    model: M,
    options: CallOptions,
}

impl<M: ChatModel> QuerySynthesizer<M> {
    pub const fn new(model: M) -> Self {
        Self {
            model,
            options: CallOptions { timeout: None },
        }
    }

    #[must_use]
    pub const fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub const fn model(&self) -> &M {
        &self.model
    }

    /// Ask the model for a query answering `request` against `schema`, then clean up and check
    /// its response.
    pub async fn synthesize_sql(
        &self,
        schema: &SchemaDescription,
        request: &str,
        dialect: Dialect,
    ) -> Result<CandidateQuery> {
        let messages = build_prompt(schema, request, dialect);

        debug!(prompt = %messages[1].content, "sending prompt");

        let completion = self.model.complete(&messages, &self.options);

        let raw = match self.options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, completion)
                .await
                .map_err(|_| SynthesisError::TimedOut(timeout))?,
            None => completion.await,
        }
        .map_err(SynthesisError::Model)?;

        debug!(response = %raw, "received model response");

        let query = accept_response(&raw, dialect)?;

        info!(sql = %query, "synthesized query");

        Ok(query)
    }
}

/// Synthesize a query with `model` and default call options.
pub async fn synthesize_sql<M: ChatModel>(
    model: &M,
    schema: &SchemaDescription,
    request: &str,
    dialect: Dialect,
) -> Result<CandidateQuery> {
    let messages = build_prompt(schema, request, dialect);
    let raw = model
        .complete(&messages, &CallOptions::default())
        .await
        .map_err(SynthesisError::Model)?;

    Ok(accept_response(&raw, dialect)?)
}

/// The system and user messages sent to the model.
#[must_use]
pub fn build_prompt(
    schema: &SchemaDescription,
    request: &str,
    dialect: Dialect,
) -> Vec<ChatMessage> {
    let dialect = dialect.display_name();

    let user = format!(
        "Generate one {dialect} SQL query for the database described below. \
        The result will be plotted as a bar, line or pie chart, so prefer queries that return a \
        label column and a numeric column.\n\n\
        {schema}\n\
        The request comes from speech recognition and may contain transcription mistakes. \
        Rectify it against the schema before translating it.\n\
        Request: \"{request}\"\n\n\
        Return only the SQL statement. Do not wrap it in markdown code fences, do not prefix it \
        with the word sql, and do not add any explanation."
    );

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// Clean up `raw` and apply the response policy: exactly one statement, and no prose.
///
/// Text that `sqlparser` cannot handle but which starts with a SQL keyword is accepted as long as
/// it holds a single `;` separated statement, so dialect extensions the parser does not know are
/// left to the database to judge.
pub fn accept_response(raw: &str, dialect: Dialect) -> Result<CandidateQuery, SynthesisError> {
    let sql = clean_response(raw);

    if sql.is_empty() {
        return Err(SynthesisError::EmptyResponse);
    }

    match statement_shape(&sql, dialect) {
        StatementShape::Single | StatementShape::Unparsed => Ok(CandidateQuery(sql)),
        StatementShape::Multiple(0) => Err(SynthesisError::EmptyResponse),
        StatementShape::Multiple(n) => Err(SynthesisError::MultipleStatements(n)),
        StatementShape::NotSql => Err(SynthesisError::NotSql(excerpt(&sql))),
    }
}

/// Strip markdown fences, an inline code span, an echoed dialect keyword and a trailing
/// semicolon.
///
/// When the response holds a fenced block anywhere, only the first block's content is kept.
#[must_use]
pub fn clean_response(raw: &str) -> String {
    let text = raw.trim();

    let text = match text.split_once("```") {
        Some((_, rest)) => {
            let block = rest.split_once("```").map_or(rest, |(block, _)| block);
            strip_info_string(block)
        }
        None => text,
    };

    let text = strip_echoed_keyword(unwrap_inline_code(text.trim()).trim());

    text.trim_end_matches(';').trim_end().to_owned()
}

/// Unwrap text that is exactly one inline code span, as in "`SELECT 1`".
///
/// Backticks that quote MySQL identifiers are left alone.
fn unwrap_inline_code(text: &str) -> &str {
    if text.starts_with("``") {
        return text;
    }

    text.strip_prefix('`')
        .and_then(|e| e.strip_suffix('`'))
        .filter(|e| !e.contains('`'))
        .unwrap_or(text)
}

/// Drop a fence info string such as the `sql` in "```sql\n".
fn strip_info_string(block: &str) -> &str {
    match block.split_once('\n') {
        Some((first, rest)) if is_echoed_keyword(first.trim()) || first.trim().is_empty() => rest,
        _ => block,
    }
}

fn strip_echoed_keyword(text: &str) -> &str {
    let word_end = text
        .find(|c: char| c.is_whitespace())
        .unwrap_or(text.len());

    let (word, rest) = text.split_at(word_end);
    let word = word.trim_end_matches(':');

    if is_echoed_keyword(word) {
        rest.trim_start()
    } else {
        text
    }
}

fn is_echoed_keyword(word: &str) -> bool {
    ECHOED_KEYWORDS.iter().any(|e| e.eq_ignore_ascii_case(word))
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 80;

    match text.char_indices().nth(MAX) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text.to_owned(),
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Mutex, time::Duration};

    use voxql_sqlparse::db::Dialect;

    use super::{QuerySynthesizer, accept_response, build_prompt, clean_response, synthesize_sql};
    use crate::{
        error::{Error, SynthesisError},
        introspect::SchemaDescription,
        model::{CallOptions, ChatMessage, ChatModel, ModelError, Role},
    };

    /// Answers every request with the same canned response and remembers what it was sent.
    struct CannedModel {
        response: Result<String, String>,
        delay: Option<Duration>,
        seen: Mutex<Vec<ChatMessage>>,
    }

    impl CannedModel {
        fn answering(response: &str) -> Self {
            Self {
                response: Ok(response.to_owned()),
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                response: Err(message.to_owned()),
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatModel for CannedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _options: &CallOptions,
        ) -> Result<String, ModelError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.extend_from_slice(messages);
            }

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.response.clone().map_err(ModelError::Other)
        }
    }

    fn schema() -> SchemaDescription {
        [("t", "CREATE TABLE t (id INTEGER, val TEXT)")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_clean_fenced_single_line() {
        assert_eq!(clean_response("```SELECT 1```"), "SELECT 1");
        assert_eq!(clean_response("  ```SELECT 1```  \n"), "SELECT 1");
    }

    #[test]
    fn test_clean_fenced_with_info_string() {
        assert_eq!(
            clean_response("```sql\nSELECT val FROM t;\n```"),
            "SELECT val FROM t"
        );
        assert_eq!(
            clean_response("```postgresql\nSELECT val\nFROM t\n```"),
            "SELECT val\nFROM t"
        );
    }

    #[test]
    fn test_clean_echoed_keyword() {
        assert_eq!(clean_response("sql SELECT 1"), "SELECT 1");
        assert_eq!(clean_response("SQL:\nSELECT 1"), "SELECT 1");
        assert_eq!(clean_response("`SELECT 1`"), "SELECT 1");
        assert_eq!(clean_response("SELECT sqlite_version()"), "SELECT sqlite_version()");
    }

    #[test]
    fn test_clean_keeps_quoted_identifiers() {
        assert_eq!(
            clean_response("SELECT region, SUM(amount) AS `total` FROM sales GROUP BY region ORDER BY `total`"),
            "SELECT region, SUM(amount) AS `total` FROM sales GROUP BY region ORDER BY `total`"
        );
        assert_eq!(
            clean_response("```sql\nSELECT * FROM `sales`\n```"),
            "SELECT * FROM `sales`"
        );
        assert_eq!(
            clean_response("`SELECT * FROM sales;`"),
            "SELECT * FROM sales"
        );

        let query = accept_response("```mysql\nSELECT `name` FROM `customers`;\n```", Dialect::MySql)
            .expect("Failed to accept");
        assert_eq!(query.as_str(), "SELECT `name` FROM `customers`");
    }

    #[test]
    fn test_clean_preamble_before_fence() {
        assert_eq!(
            clean_response("Here is the query:\n```sql\nSELECT 1\n```\nIt returns one."),
            "SELECT 1"
        );
    }

    #[test]
    fn test_response_policy() {
        assert_eq!(
            accept_response("SELECT val FROM t", Dialect::Sqlite)
                .expect("Failed to accept")
                .as_str(),
            "SELECT val FROM t"
        );

        assert!(matches!(
            accept_response("SELECT 1; DELETE FROM t", Dialect::Sqlite),
            Err(SynthesisError::MultipleStatements(2))
        ));
        assert!(matches!(
            accept_response(
                "SELECT val FROM t; DELETE FROM t; SELECT val FROM t WHERE val GLOB 'o*'",
                Dialect::Sqlite
            ),
            Err(SynthesisError::MultipleStatements(3))
        ));
        assert!(matches!(
            accept_response("I could not find such data in the schema.", Dialect::MySql),
            Err(SynthesisError::NotSql(_))
        ));
        assert!(matches!(
            accept_response("``` ```", Dialect::Postgres),
            Err(SynthesisError::EmptyResponse)
        ));
        assert!(matches!(
            accept_response("", Dialect::Postgres),
            Err(SynthesisError::EmptyResponse)
        ));
    }

    #[test]
    fn test_prompt_embeds_dialect_schema_and_request() {
        let messages = build_prompt(&schema(), "show me all values", Dialect::Postgres);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("PostgreSQL"));
        assert!(messages[1].content.contains("CREATE TABLE t (id INTEGER, val TEXT)"));
        assert!(messages[1].content.contains("\"show me all values\""));
    }

    #[tokio::test]
    async fn test_synthesize_strips_fences() {
        let model = CannedModel::answering("```SELECT 1```");

        let query = synthesize_sql(&model, &schema(), "one", Dialect::Sqlite)
            .await
            .expect("Failed to synthesize");

        assert_eq!(query.as_str(), "SELECT 1");
        assert_eq!(model.seen.lock().map(|e| e.len()).unwrap_or_default(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_is_synthesis_error() {
        let synthesizer = QuerySynthesizer::new(CannedModel::failing("service unavailable"));

        let err = synthesizer
            .synthesize_sql(&schema(), "anything", Dialect::Sqlite)
            .await
            .expect_err("model failure must surface");

        assert!(matches!(
            err,
            Error::Synthesis(SynthesisError::Model(ModelError::Other(ref e))) if e == "service unavailable"
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut model = CannedModel::answering("SELECT 1");
        model.delay = Some(Duration::from_secs(30));

        let synthesizer = QuerySynthesizer::new(model)
            .with_options(CallOptions::with_timeout(Duration::from_millis(20)));

        let err = synthesizer
            .synthesize_sql(&schema(), "anything", Dialect::Sqlite)
            .await
            .expect_err("slow model must time out");

        assert!(matches!(
            err,
            Error::Synthesis(SynthesisError::TimedOut(d)) if d == Duration::from_millis(20)
        ));
    }
}
