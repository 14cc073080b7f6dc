//! Remote vision assistant: sends a capture to a hosted model and keeps
//! the follow-up conversation about it.
//!
//! Architecture:
//! - gemini.rs: Gemini `generateContent` REST client with chat history
//! - options.rs: `[OPTIONS: ...]` tag parsing
//! - prompts.rs: system instruction and request constants

mod gemini;
mod options;
pub mod prompts;

pub use gemini::GeminiAssistant;
pub use options::{split_options, ParsedReply};

use async_trait::async_trait;

/// Model and key the assistant talks with. Swapped at runtime when the
/// user changes settings.
#[derive(Clone, PartialEq, Eq)]
pub struct AssistantCredentials {
    pub model: String,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for AssistantCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantCredentials")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|k| format!("<{} chars>", k.len())))
            .finish()
    }
}

#[async_trait]
pub trait Assistant: Send + Sync {
    fn configure(&self, credentials: AssistantCredentials);

    /// Drop any previous conversation and open a new one about this image.
    async fn start_session(&self, screenshot_png: &[u8]) -> Result<String, AssistantError>;

    /// Continue the current conversation.
    async fn follow_up(&self, message: &str) -> Result<String, AssistantError>;

    /// One-shot request outside the conversation to validate credentials.
    async fn health_check(&self) -> Result<(), AssistantError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("No API key configured, add one in Settings")]
    MissingApiKey,

    #[error("Session not started")]
    SessionNotStarted,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Response contained no text")]
    EmptyResponse,

    #[error("Could not encode screenshot: {0}")]
    Encode(String),
}
