//! Together AI embedding provider using the OpenAI-compatible embeddings API.
//!
//! This module is only available when the `together` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// The default Together API base URL.
pub const TOGETHER_API_BASE: &str = "https://api.together.xyz/v1";

/// The default retrieval embedding model.
const DEFAULT_MODEL: &str = "togethercomputer/m2-bert-80M-32k-retrieval";

/// The default dimensionality used for zero-vector fallbacks and collection setup.
const DEFAULT_DIMENSIONS: usize = 1024;

const PROVIDER: &str = "Together";

/// An [`EmbeddingProvider`] backed by the Together embeddings API.
///
/// Uses `reqwest` to call the `/embeddings` endpoint directly. Wrap it in a
/// [`BatchingEmbedder`](crate::BatchingEmbedder) to respect upstream rate
/// limits during ingestion.
///
/// # Configuration
///
/// - `model` – defaults to `togethercomputer/m2-bert-80M-32k-retrieval`.
/// - `dimensions` – defaults to 1024; must match what the model returns.
/// - `api_key` – from the constructor or the `TOGETHER_API_KEY` environment variable.
/// - `base_url` – defaults to [`TOGETHER_API_BASE`].
///
/// # Example
///
/// ```rust,ignore
/// use ordinance_rag::together::TogetherEmbeddingProvider;
///
/// let provider = TogetherEmbeddingProvider::from_env()?;
/// let embedding = provider.embed("parking requirements").await?;
/// ```
pub struct TogetherEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl TogetherEmbeddingProvider {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Embedding {
                provider: PROVIDER.into(),
                message: "API key must not be empty".into(),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: TOGETHER_API_BASE.into(),
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Create a new provider using the `TOGETHER_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("TOGETHER_API_KEY").map_err(|_| RagError::Embedding {
            provider: PROVIDER.into(),
            message: "TOGETHER_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the expected output dimensionality.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }

    /// Point the provider at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn fail(message: String) -> RagError {
        RagError::Embedding { provider: PROVIDER.into(), message }
    }
}

// ── Embeddings API request/response types ──────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for TogetherEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| Self::fail("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body = EmbeddingRequest { model: &self.model, input: texts.to_vec() };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                Self::fail(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, %status, "API error");
            return Err(Self::fail(format!("API returned {status}: {detail}")));
        }

        let mut embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::fail(format!("failed to parse response: {e}"))
        })?;

        // The API may return items out of order; `index` restores input order.
        embedding_response.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));

        if let Some(bad) = embedding_response.data.iter().find(|d| d.embedding.len() != self.dimensions)
        {
            return Err(Self::fail(format!(
                "expected {}-dimensional embeddings, got {}",
                self.dimensions,
                bad.embedding.len()
            )));
        }

        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
