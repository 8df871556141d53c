//! In-memory vector store using cosine distance.
//!
//! This module provides [`InMemoryVectorStore`], a dependency-free vector
//! store backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is
//! suitable for development, testing, and small ordinance corpora.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{IndexedDocument, SearchResult};
use crate::error::{RagError, Result};
use crate::filter::FilterPredicate;
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";

#[derive(Debug)]
struct Collection {
    dimensions: usize,
    /// Insertion order is the tie-break order for equal scores.
    documents: Vec<IndexedDocument>,
    /// Position of each id in `documents`.
    positions: HashMap<String, usize>,
}

impl Collection {
    fn new(dimensions: usize) -> Self {
        Self { dimensions, documents: Vec::new(), positions: HashMap::new() }
    }

    fn put(&mut self, document: &IndexedDocument) {
        match self.positions.get(&document.id) {
            Some(&at) => self.documents[at] = document.clone(),
            None => {
                self.positions.insert(document.id.clone(), self.documents.len());
                self.documents.push(document.clone());
            }
        }
    }

    fn remove(&mut self, ids: &[&str]) {
        self.documents.retain(|d| !ids.contains(&d.id.as_str()));
        self.positions =
            self.documents.iter().enumerate().map(|(at, d)| (d.id.clone(), at)).collect();
    }
}

/// An in-memory vector store.
///
/// Each write takes the lock once, so a whole `upsert` batch becomes visible
/// to readers at the same time.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> RagError {
    RagError::store(BACKEND, format!("collection '{collection}' does not exist"))
}

fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

/// Compute cosine distance `1 - cos(a, b)`.
///
/// A zero-magnitude vector is at distance 1 from everything.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Collection::new(dimensions));
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn collection_dimensions(&self, name: &str) -> Result<Option<usize>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.dimensions))
    }

    async fn upsert(&self, collection: &str, documents: &[IndexedDocument]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;

        if let Some(bad) = documents.iter().find(|d| d.embedding.len() != store.dimensions) {
            return Err(RagError::store(
                BACKEND,
                format!(
                    "document '{}' has {} dimensions, collection '{collection}' expects {}",
                    bad.id,
                    bad.embedding.len(),
                    store.dimensions
                ),
            ));
        }

        for document in documents {
            store.put(document);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        store.remove(ids);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<SearchResult>> {
        if let Some(filter) = filter {
            filter.validate()?;
        }

        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        // Zero vectors (embedding fallback) rank after every real document,
        // even one with a negative cosine to the query.
        let mut scored: Vec<(bool, SearchResult)> = store
            .documents
            .iter()
            .filter(|d| filter.is_none_or(|f| f.matches(&d.metadata)))
            .map(|d| {
                let result = SearchResult {
                    id: d.id.clone(),
                    document: d.text.clone(),
                    metadata: d.metadata.clone(),
                    relevance_score: 1.0 - cosine_distance(&d.embedding, embedding),
                };
                (is_zero(&d.embedding), result)
            })
            .collect();

        // `sort_by` is stable, so equal scores keep insertion order here.
        scored.sort_by(|(a_zero, a), (b_zero, b)| {
            a_zero.cmp(b_zero).then_with(|| {
                b.relevance_score
                    .partial_cmp(&a.relevance_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        scored.truncate(top_k);
        Ok(scored.into_iter().map(|(_, result)| result).collect())
    }

    async fn list(&self, collection: &str) -> Result<Vec<IndexedDocument>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store.documents.clone())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store.documents.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, state: &str, embedding: Vec<f32>) -> IndexedDocument {
        IndexedDocument {
            id: id.to_string(),
            text: format!("Content:\n{id}"),
            metadata: [("state".to_string(), state.to_string())].into_iter().collect(),
            embedding,
        }
    }

    #[test]
    fn zero_vectors_are_maximally_distant() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimensions() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        let err = store.upsert("c", &[doc("a", "ca", vec![1.0])]).await.unwrap_err();
        assert!(matches!(err, RagError::Store { .. }));
        assert_eq!(store.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store.upsert("c", &[doc("a", "ca", vec![1.0, 0.0])]).await.unwrap();
        store.upsert("c", &[doc("a", "nv", vec![0.0, 1.0])]).await.unwrap();
        let docs = store.list("c").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata["state"], "nv");
    }

    #[tokio::test]
    async fn search_applies_filter_before_top_k() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                &[
                    doc("near", "ca", vec![1.0, 0.0]),
                    doc("mid", "nv", vec![1.0, 1.0]),
                    doc("far", "nv", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let filter = FilterPredicate::field("state", "nv");
        let results = store.search("c", &[1.0, 0.0], 1, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "mid");
    }

    #[tokio::test]
    async fn zero_vectors_rank_below_negative_matches() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .upsert("c", &[doc("fallback", "ca", vec![0.0, 0.0]), doc("real", "ca", vec![-0.5, 1.0])])
            .await
            .unwrap();

        let results = store.search("c", &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(results[0].id, "real");
        assert!(results[0].relevance_score < 0.0);
        assert_eq!(results[1].id, "fallback");
        assert_eq!(results[1].relevance_score, 0.0);
    }

    #[tokio::test]
    async fn delete_keeps_replacement_by_id_working() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                &[doc("a", "ca", vec![1.0, 0.0]), doc("b", "ca", vec![0.0, 1.0]), doc("c", "ca", vec![1.0, 1.0])],
            )
            .await
            .unwrap();
        store.delete("c", &["a"]).await.unwrap();
        store.upsert("c", &[doc("c", "nv", vec![1.0, 1.0])]).await.unwrap();

        let docs = store.list("c").await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert_eq!(docs[1].metadata["state"], "nv");
    }

    #[tokio::test]
    async fn missing_collection_is_a_store_error() {
        let store = InMemoryVectorStore::new();
        let err = store.search("nope", &[1.0], 3, None).await.unwrap_err();
        assert!(matches!(err, RagError::Store { .. }));
    }
}
