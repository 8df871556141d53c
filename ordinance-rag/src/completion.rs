//! Completion engine trait and the chat message protocol.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Author of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One message of a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// The message list shared by both completion modes: exactly one system
/// message followed by exactly one user message.
pub fn messages(system_prompt: &str, user_prompt: &str) -> [ChatMessage; 2] {
    [ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)]
}

/// A lazy, finite sequence of answer fragments in delivery order.
///
/// The stream is pulled one chunk at a time. Dropping it abandons the
/// upstream generation.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A remote LLM behind a fixed model and temperature.
#[async_trait]
pub trait CompletionEngine: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Request a full answer in one call.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Request an answer as incremental text fragments.
    ///
    /// Errors establishing the stream are returned directly; errors while
    /// reading it are yielded as stream items.
    async fn stream_complete(&self, system_prompt: &str, user_prompt: &str) -> Result<ChunkStream>;
}
