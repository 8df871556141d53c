//! Embedding provider trait and the batching wrapper used during ingestion.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Short backend name used in logs and errors.
    fn name(&self) -> &str {
        "embedding"
    }
}

#[async_trait]
impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<P> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Counters describing how a [`BatchingEmbedder`] has behaved so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddingStats {
    /// Batches sent to the inner provider.
    pub batches: usize,
    /// Batches that failed and were replaced by zero vectors.
    pub fallback_batches: usize,
    /// Texts that received a zero vector.
    pub fallback_texts: usize,
}

/// Splits embedding requests into fixed-size batches and substitutes zero
/// vectors for any batch the inner provider fails on.
///
/// The fallback keeps ingestion moving at the cost of retrieval quality for
/// the affected texts: a zero vector scores 0 against every query and is ranked after
/// every real document. Every
/// substitution is logged at `warn` level and counted in
/// [`EmbeddingStats`].
///
/// Single-text [`embed`](EmbeddingProvider::embed) calls (query embedding)
/// are passed through without fallback so a failing provider is reported to
/// the caller instead of silently matching nothing.
pub struct BatchingEmbedder<P> {
    inner: P,
    batch_size: usize,
    batches: AtomicUsize,
    fallback_batches: AtomicUsize,
    fallback_texts: AtomicUsize,
}

impl<P: EmbeddingProvider> BatchingEmbedder<P> {
    /// Default number of texts per upstream request.
    pub const DEFAULT_BATCH_SIZE: usize = 32;

    pub fn new(inner: P) -> Self {
        Self::with_batch_size(inner, Self::DEFAULT_BATCH_SIZE)
    }

    /// Wrap `inner`, sending at most `batch_size` texts per request.
    /// A zero batch size is treated as one.
    pub fn with_batch_size(inner: P, batch_size: usize) -> Self {
        Self {
            inner,
            batch_size: batch_size.max(1),
            batches: AtomicUsize::new(0),
            fallback_batches: AtomicUsize::new(0),
            fallback_texts: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Snapshot of the fallback counters.
    pub fn stats(&self) -> EmbeddingStats {
        EmbeddingStats {
            batches: self.batches.load(Ordering::Relaxed),
            fallback_batches: self.fallback_batches.load(Ordering::Relaxed),
            fallback_texts: self.fallback_texts.load(Ordering::Relaxed),
        }
    }

    fn zero_batch(&self, len: usize) -> Vec<Vec<f32>> {
        vec![vec![0.0; self.inner.dimensions()]; len]
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for BatchingEmbedder<P> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());
        for (index, batch) in texts.chunks(self.batch_size).enumerate() {
            self.batches.fetch_add(1, Ordering::Relaxed);
            let embeddings = match self.inner.embed_batch(batch).await {
                Ok(embeddings) if embeddings.len() == batch.len() => embeddings,
                Ok(embeddings) => {
                    let reason = format!(
                        "provider returned {} embeddings for {} texts",
                        embeddings.len(),
                        batch.len()
                    );
                    self.record_fallback(index, batch.len(), &reason);
                    self.zero_batch(batch.len())
                }
                Err(e) => {
                    self.record_fallback(index, batch.len(), &e.to_string());
                    self.zero_batch(batch.len())
                }
            };
            debug!(provider = self.inner.name(), batch = index, size = batch.len(), "embedded batch");
            all.extend(embeddings);
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

impl<P: EmbeddingProvider> BatchingEmbedder<P> {
    fn record_fallback(&self, batch: usize, size: usize, reason: &str) {
        self.fallback_batches.fetch_add(1, Ordering::Relaxed);
        self.fallback_texts.fetch_add(size, Ordering::Relaxed);
        warn!(
            provider = self.inner.name(),
            batch,
            size,
            error = reason,
            "embedding batch failed, substituting zero vectors"
        );
    }
}
