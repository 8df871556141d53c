//! Configuration for the ordinance store and the query pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Default collection name used when none is configured.
pub const DEFAULT_COLLECTION: &str = "ordinances";

/// Default persona given to the completion model.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant specialized in municipal ordinances. Answer questions accurately based on the provided context.";

/// Default chat model served by the inference endpoint.
pub const DEFAULT_COMPLETION_MODEL: &str = "Llama3.2-90B-Vision-Instruct";

/// Configuration parameters for retrieval and ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Name of the active collection.
    pub collection_name: String,
    /// Number of passages retrieved per query.
    pub top_k: usize,
    /// Number of documents written per store batch during ingestion.
    pub upsert_batch_size: usize,
    /// Number of texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Optional character cap on the assembled prompt context.
    pub max_context_chars: Option<usize>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            collection_name: DEFAULT_COLLECTION.to_string(),
            top_k: 5,
            upsert_batch_size: 100,
            embedding_batch_size: 32,
            max_context_chars: None,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the name of the active collection.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Set the number of passages retrieved per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the number of documents written per store batch.
    pub fn upsert_batch_size(mut self, size: usize) -> Self {
        self.config.upsert_batch_size = size;
        self
    }

    /// Set the number of texts sent per embedding request.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Cap the assembled prompt context at `chars` characters.
    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = Some(chars);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `collection_name` is blank
    /// - `top_k == 0`
    /// - either batch size is zero
    pub fn build(self) -> Result<RagConfig> {
        if self.config.collection_name.trim().is_empty() {
            return Err(RagError::Config("collection_name must not be empty".to_string()));
        }
        if self.config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.config.upsert_batch_size == 0 {
            return Err(RagError::Config(
                "upsert_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.config.embedding_batch_size == 0 {
            return Err(RagError::Config(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(self.config)
    }
}

/// Fixed settings for the completion model.
///
/// Model, temperature and persona are fixed for the lifetime of an engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// System prompt prepended to every request.
    pub system_prompt: String,
    /// Base URL of an OpenAI-compatible inference API (without `/chat/completions`).
    pub base_url: String,
    /// Optional bearer token.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            temperature: 0.1,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            base_url: "http://localhost:5050/v1".to_string(),
            api_key: None,
        }
    }
}

impl CompletionConfig {
    /// Create a configuration for the given endpoint and model.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), model: model.into(), ..Self::default() }
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Replace the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}
