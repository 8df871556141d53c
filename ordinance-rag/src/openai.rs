//! Completion engine for OpenAI-compatible chat APIs.
//!
//! Works with any server exposing `POST {base_url}/chat/completions`
//! (Llama Stack, Together, vLLM, Ollama, OpenAI). Streaming responses are
//! read as server-sent events.
//!
//! This module is only available when the `openai` feature is enabled.

use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::completion::{ChatMessage, ChunkStream, CompletionEngine, messages};
use crate::config::CompletionConfig;
use crate::error::{RagError, Result};

const PROVIDER: &str = "OpenAICompatible";

/// Marker that terminates an OpenAI-style event stream.
const DONE: &str = "[DONE]";

/// A [`CompletionEngine`] speaking the OpenAI chat completions protocol.
///
/// # Example
///
/// ```rust,ignore
/// use ordinance_rag::{CompletionConfig, openai::OpenAICompatibleCompletion};
///
/// let engine = OpenAICompatibleCompletion::new(
///     CompletionConfig::new("http://localhost:5050/v1", "Llama3.2-90B-Vision-Instruct"),
/// )?;
/// let answer = engine.complete("You are terse.", "What is a setback?").await?;
/// ```
pub struct OpenAICompatibleCompletion {
    client: reqwest::Client,
    config: CompletionConfig,
}

impl OpenAICompatibleCompletion {
    /// Create a new engine.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the base URL or model is empty.
    pub fn new(config: CompletionConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(RagError::Config("completion base_url must not be empty".into()));
        }
        if config.model.trim().is_empty() {
            return Err(RagError::Config("completion model must not be empty".into()));
        }
        let config = CompletionConfig {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ..config
        };
        Ok(Self { client: reqwest::Client::new(), config })
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            stream,
        };

        let mut request =
            self.client.post(format!("{}/chat/completions", self.config.base_url)).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "request failed");
            RagError::completion(PROVIDER, format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(provider = PROVIDER, %status, "API error");
            return Err(RagError::completion(PROVIDER, format!("API returned {status}: {detail}")));
        }

        Ok(response)
    }
}

// ── Chat API request/response types ────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── CompletionEngine implementation ────────────────────────────────

#[async_trait]
impl CompletionEngine for OpenAICompatibleCompletion {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.config.model, "requesting completion");

        let response = self.send(&messages(system_prompt, user_prompt), false).await?;
        let chat: ChatResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::completion(PROVIDER, format!("failed to parse response: {e}"))
        })?;

        let answer = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RagError::completion(PROVIDER, "response contained no message content"))?;

        info!(provider = PROVIDER, answer_len = answer.len(), "completion finished");
        Ok(answer)
    }

    async fn stream_complete(&self, system_prompt: &str, user_prompt: &str) -> Result<ChunkStream> {
        debug!(provider = PROVIDER, model = %self.config.model, "requesting streamed completion");

        let response = self.send(&messages(system_prompt, user_prompt), true).await?;
        let mut events = Box::pin(response.bytes_stream().eventsource());

        let stream = try_stream! {
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| {
                    error!(provider = PROVIDER, error = %e, "stream read failed");
                    RagError::completion(PROVIDER, format!("stream error: {e}"))
                })?;

                if event.data.trim() == DONE {
                    break;
                }

                let chunk: ChatChunk = serde_json::from_str(&event.data).map_err(|e| {
                    RagError::completion(PROVIDER, format!("malformed stream chunk: {e}"))
                })?;

                let content = chunk.choices.into_iter().next().and_then(|c| c.delta.content);
                if let Some(content) = content.filter(|c| !c.is_empty()) {
                    yield content;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
