//! Deterministic feature-hashing embedder.
//!
//! [`HashingEmbedder`] maps lower-cased alphanumeric tokens into a fixed
//! number of buckets and L2-normalises the counts. It needs no network
//! access, so it backs tests, demos, and offline deployments.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

/// A bag-of-words embedder using the hashing trick.
///
/// Texts sharing tokens get positive cosine similarity; identical texts get
/// identical vectors. Texts without any token embed to the zero vector.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a, stable across platforms and releases.
        let hash = token
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| (acc ^ b as u64).wrapping_mul(0x100_0000_01b3));
        (hash % self.dimensions as u64) as usize
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            vector[self.bucket(&token.to_lowercase())] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn identical_texts_have_unit_similarity() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Fire Code, section 3").await.unwrap();
        let b = embedder.embed("fire code section 3").await.unwrap();
        assert!((dot(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_tokens_score_higher() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed("fire").await.unwrap();
        let fire = embedder.embed("fire code").await.unwrap();
        let parking = embedder.embed("parking rules").await.unwrap();
        assert!(dot(&query, &fire) > dot(&query, &parking));
    }

    #[tokio::test]
    async fn punctuation_only_text_is_zero() {
        let embedder = HashingEmbedder::new(8);
        let v = embedder.embed("  ,;- ").await.unwrap();
        assert_eq!(v, vec![0.0; 8]);
    }
}
