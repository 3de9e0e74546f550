//! [`ChatModel`] and [`Transcriber`] backed by an OpenAI compatible HTTP API.

use reqwest::{
    Client, RequestBuilder,
    multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::model::{AudioClip, CallOptions, ChatMessage, ChatModel, ModelError, Transcriber};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

#[derive(Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub transcription_model: String,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_owned(),
            chat_model: DEFAULT_CHAT_MODEL.to_owned(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_owned(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    #[must_use]
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("transcription_model", &self.transcription_model)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Chat completions via `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiChat {
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

impl ChatModel for OpenAiChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CallOptions,
    ) -> Result<String, ModelError> {
        debug!(model = %self.config.chat_model, "requesting chat completion");

        let request = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.chat_model,
                "messages": messages,
                "temperature": 0,
            }));

        let body = send(request, options).await?;

        chat_content(&body)
    }
}

/// Speech to text via `POST {base_url}/audio/transcriptions`.
#[derive(Debug, Clone)]
pub struct OpenAiTranscriber {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiTranscriber {
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

impl Transcriber for OpenAiTranscriber {
    async fn transcribe(
        &self,
        clip: &AudioClip,
        options: &CallOptions,
    ) -> Result<String, ModelError> {
        debug!(
            model = %self.config.transcription_model,
            bytes = clip.data.len(),
            "requesting transcription"
        );

        let file = Part::bytes(clip.data.clone())
            .file_name(clip.file_name.clone())
            .mime_str(audio_mime(&clip.file_name))?;

        let form = Form::new()
            .text("model", self.config.transcription_model.clone())
            .part("file", file);

        let request = self
            .client
            .post(self.config.endpoint("audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .multipart(form);

        let body = send(request, options).await?;
        let parsed: TranscriptionResponse = serde_json::from_str(&body)?;

        Ok(parsed.text.trim().to_owned())
    }
}

async fn send(request: RequestBuilder, options: &CallOptions) -> Result<String, ModelError> {
    let request = match options.timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    };

    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ModelError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}

fn chat_content(body: &str) -> Result<String, ModelError> {
    let parsed: ChatResponse = serde_json::from_str(body)?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|e| e.message.content)
        .ok_or(ModelError::MissingContent)
}

fn audio_mime(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "wav" => "audio/wav",
        "mp3" | "mpga" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "webm" => "audio/webm",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}
