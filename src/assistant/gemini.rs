//! Gemini `generateContent` client.
//!
//! The REST API is stateless, so the conversation is replayed on every
//! turn. History only grows on successful exchanges.

use super::prompts::{
    API_BASE, HEALTH_CHECK_PROMPT, IMAGE_CAPTION, MAX_OUTPUT_TOKENS, SYSTEM_INSTRUCTION,
};
use super::{Assistant, AssistantCredentials, AssistantError};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Instant;

pub struct GeminiAssistant {
    client: reqwest::Client,
    base_url: String,
    credentials: Mutex<AssistantCredentials>,
    /// `None` until the first screenshot is sent.
    history: tokio::sync::Mutex<Option<Vec<Value>>>,
}

impl GeminiAssistant {
    pub fn new(credentials: AssistantCredentials) -> Self {
        Self::with_base_url(credentials, API_BASE)
    }

    pub fn with_base_url(credentials: AssistantCredentials, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: Mutex::new(credentials),
            history: tokio::sync::Mutex::new(None),
        }
    }

    fn credentials(&self) -> AssistantCredentials {
        match self.credentials.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn generate(&self, contents: &[Value]) -> Result<String, AssistantError> {
        let credentials = self.credentials();
        let api_key = credentials
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or(AssistantError::MissingApiKey)?;

        let url = endpoint(&self.base_url, &credentials.model);
        log::info!("[ASSISTANT] Model: {} ({} turns)", credentials.model, contents.len());
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &api_key)
            .header("content-type", "application/json")
            .json(&build_request(contents))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("[ASSISTANT] API returned {}: {}", status, body);
            return Err(AssistantError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        let text = extract_text(&body).ok_or(AssistantError::EmptyResponse)?;
        log::info!(
            "[ASSISTANT] Reply of {} chars in {}ms",
            text.len(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

#[async_trait]
impl Assistant for GeminiAssistant {
    fn configure(&self, credentials: AssistantCredentials) {
        log::info!("[ASSISTANT] Using {:?}", credentials);
        match self.credentials.lock() {
            Ok(mut guard) => *guard = credentials,
            Err(poisoned) => *poisoned.into_inner() = credentials,
        }
    }

    async fn start_session(&self, screenshot_png: &[u8]) -> Result<String, AssistantError> {
        let mut history = self.history.lock().await;
        *history = Some(Vec::new());

        let turn = image_turn(screenshot_png);
        let reply = self.generate(std::slice::from_ref(&turn)).await?;

        if let Some(history) = history.as_mut() {
            history.push(turn);
            history.push(model_turn(&reply));
        }
        Ok(reply)
    }

    async fn follow_up(&self, message: &str) -> Result<String, AssistantError> {
        let mut history = self.history.lock().await;
        let history = history.as_mut().ok_or(AssistantError::SessionNotStarted)?;

        let mut contents = history.clone();
        contents.push(text_turn(message));
        let reply = self.generate(&contents).await?;

        history.push(text_turn(message));
        history.push(model_turn(&reply));
        Ok(reply)
    }

    async fn health_check(&self) -> Result<(), AssistantError> {
        self.generate(&[text_turn(HEALTH_CHECK_PROMPT)]).await.map(|_| ())
    }
}

fn endpoint(base_url: &str, model: &str) -> String {
    format!("{}/v1beta/models/{}:generateContent", base_url, model)
}

fn build_request(contents: &[Value]) -> Value {
    json!({
        "system_instruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
        "contents": contents,
        "generationConfig": { "maxOutputTokens": MAX_OUTPUT_TOKENS },
    })
}

fn image_turn(png: &[u8]) -> Value {
    let data = base64::engine::general_purpose::STANDARD.encode(png);
    json!({
        "role": "user",
        "parts": [
            { "text": IMAGE_CAPTION },
            { "inline_data": { "mime_type": "image/png", "data": data } },
        ]
    })
}

fn text_turn(text: &str) -> Value {
    json!({ "role": "user", "parts": [{ "text": text }] })
}

fn model_turn(text: &str) -> Value {
    json!({ "role": "model", "parts": [{ "text": text }] })
}

/// Concatenate the text parts of the first candidate.
fn extract_text(body: &Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
