//! Vector store trait for storing and searching indexed ordinances.

use async_trait::async_trait;

use crate::document::{IndexedDocument, SearchResult};
use crate::error::Result;
use crate::filter::FilterPredicate;

/// A storage backend for embedded documents with filtered similarity search.
///
/// Implementations manage named collections that use the cosine metric.
/// A single `upsert` call must be atomic with respect to concurrent
/// `search` calls: readers never observe half of a batch.
///
/// # Example
///
/// ```rust,ignore
/// use ordinance_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("ordinances", 256).await?;
/// store.upsert("ordinances", &documents).await?;
/// let results = store.search("ordinances", &query_embedding, 5, None).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Dimensionality of an existing collection, or `None` if it does not exist.
    async fn collection_dimensions(&self, name: &str) -> Result<Option<usize>>;

    /// Insert or replace documents. Documents must have embeddings set.
    async fn upsert(&self, collection: &str, documents: &[IndexedDocument]) -> Result<()>;

    /// Delete documents by id.
    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()>;

    /// Search for the `top_k` documents closest to `embedding` among those
    /// matching `filter`.
    ///
    /// Returns results ordered by descending `relevance_score`
    /// (`1 - cosine distance`). Ordering among equal scores is unspecified.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<SearchResult>>;

    /// Return every document in the collection. Embeddings may be omitted.
    async fn list(&self, collection: &str) -> Result<Vec<IndexedDocument>>;

    /// Number of documents in the collection.
    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.list(collection).await?.len())
    }
}
