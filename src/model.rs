//! Interfaces of the external services the pipeline delegates to: a chat-completion model and a
//! speech-to-text model.
//!
//! Every call takes [`CallOptions`], so no call is unbounded by construction. Cancellation is
//! done by dropping the returned future.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged chat message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-call limits for external services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Upper bound for the whole call. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode service response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("service response contained no content")]
    MissingContent,

    #[error("{0}")]
    Other(String),
}

/// A chat-completion service.
pub trait ChatModel {
    /// Send `messages` and return the generated text.
    fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CallOptions,
    ) -> impl Future<Output = Result<String, ModelError>> + Send;
}

/// A recorded audio clip, as the encoded file the recorder produced (e.g. WAV).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub file_name: String,
    pub data: Vec<u8>,
}

impl AudioClip {
    /// Read an audio file from disk.
    pub async fn from_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;

        Ok(Self {
            file_name: path
                .file_name()
                .map_or_else(|| "audio.wav".to_owned(), |e| e.to_string_lossy().into_owned()),
            data,
        })
    }
}

/// A speech-to-text service.
pub trait Transcriber {
    fn transcribe(
        &self,
        clip: &AudioClip,
        options: &CallOptions,
    ) -> impl Future<Output = Result<String, ModelError>> + Send;
}
