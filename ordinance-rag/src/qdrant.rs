//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//! Document metadata lives in the point payload under `metadata`, and
//! filters become `must` match conditions on `metadata.<key>`.
//!
//! # Example
//!
//! ```rust,ignore
//! use ordinance_rag::{FilterPredicate, qdrant::QdrantVectorStore};
//!
//! let store = QdrantVectorStore::new("http://localhost:6334")?;
//! store.create_collection("ordinances", 1024).await?;
//! store.upsert("ordinances", &documents).await?;
//! let filter = FilterPredicate::field("state", "ca");
//! let results = store.search("ordinances", &query_embedding, 5, Some(&filter)).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointId, PointStruct, PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::debug;

use crate::document::{IndexedDocument, Metadata, SearchResult};
use crate::error::{RagError, Result};
use crate::filter::FilterPredicate;
use crate::vectorstore::VectorStore;

const BACKEND: &str = "qdrant";

/// Points fetched per scroll page when listing a collection.
const SCROLL_PAGE: u32 = 256;

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Collections use cosine distance. Qdrant reports cosine similarity as the
/// score, which is already `1 - distance`.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::store(BACKEND, e.to_string())
    }

    /// The stored payload: `{"text": .., "metadata": {..}}`.
    fn to_payload(document: &IndexedDocument) -> Result<Payload> {
        Payload::try_from(serde_json::json!({
            "text": document.text,
            "metadata": document.metadata,
        }))
        .map_err(|e| {
            RagError::store(BACKEND, format!("payload for document '{}': {e}", document.id))
        })
    }

    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn point_id(id: Option<&PointId>) -> String {
        id.and_then(|pid| match &pid.point_id_options {
            Some(PointIdOptions::Uuid(s)) => Some(s.clone()),
            Some(PointIdOptions::Num(n)) => Some(n.to_string()),
            None => None,
        })
        .unwrap_or_default()
    }

    /// Read `text` and `metadata` back out of a point payload.
    fn from_payload(payload: &HashMap<String, QdrantValue>) -> (String, Metadata) {
        let text = payload.get("text").and_then(Self::extract_string).unwrap_or_default();
        let metadata = payload
            .get("metadata")
            .and_then(|v| match &v.kind {
                Some(Kind::StructValue(s)) => Some(
                    s.fields
                        .iter()
                        .filter_map(|(k, v)| Self::extract_string(v).map(|s| (k.clone(), s)))
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();
        (text, metadata)
    }

    fn to_filter(filter: &FilterPredicate) -> Filter {
        Filter::must(
            filter
                .clauses()
                .iter()
                .map(|(key, value)| Condition::matches(format!("metadata.{key}"), value.clone())),
        )
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.client.collection_exists(name).await.map_err(Self::map_err)? {
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if !self.client.collection_exists(name).await.map_err(Self::map_err)? {
            return Ok(());
        }
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn collection_dimensions(&self, name: &str) -> Result<Option<usize>> {
        if !self.client.collection_exists(name).await.map_err(Self::map_err)? {
            return Ok(None);
        }

        let info = self.client.collection_info(name).await.map_err(Self::map_err)?;
        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|config| match config {
                VectorsConfigKind::Params(params) => Some(params.size as usize),
                VectorsConfigKind::ParamsMap(_) => None,
            });

        size.map(Some).ok_or_else(|| {
            RagError::store(BACKEND, format!("collection '{name}' has no single unnamed vector"))
        })
    }

    async fn upsert(&self, collection: &str, documents: &[IndexedDocument]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let points = documents
            .iter()
            .map(|document| {
                let payload = Self::to_payload(document)?;
                Ok(PointStruct::new(document.id.clone(), document.embedding.clone(), payload))
            })
            .collect::<Result<Vec<PointStruct>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = documents.len(), "upserted documents to qdrant");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| (*id).into()).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = ids.len(), "deleted points from qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<SearchResult>> {
        let mut request = SearchPointsBuilder::new(collection, embedding.to_vec(), top_k as u64)
            .with_payload(true);
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            filter.validate()?;
            request = request.filter(Self::to_filter(filter));
        }

        let response = self.client.search_points(request).await.map_err(Self::map_err)?;

        let results = response
            .result
            .into_iter()
            .map(|scored| {
                let (document, metadata) = Self::from_payload(&scored.payload);
                SearchResult {
                    id: Self::point_id(scored.id.as_ref()),
                    document,
                    metadata,
                    relevance_score: scored.score,
                }
            })
            .collect();

        Ok(results)
    }

    async fn list(&self, collection: &str) -> Result<Vec<IndexedDocument>> {
        let mut documents = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut request =
                ScrollPointsBuilder::new(collection).limit(SCROLL_PAGE).with_payload(true);
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }

            let page = self.client.scroll(request).await.map_err(Self::map_err)?;
            documents.extend(page.result.into_iter().map(|point| {
                let (text, metadata) = Self::from_payload(&point.payload);
                IndexedDocument {
                    id: Self::point_id(point.id.as_ref()),
                    text,
                    metadata,
                    embedding: Vec::new(),
                }
            }));

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!(collection, count = documents.len(), "listed qdrant collection");
        Ok(documents)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(Self::map_err)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_target_metadata_payload() {
        let filter = FilterPredicate::field("state", "ca").and("city", "campbell");
        let qdrant = QdrantVectorStore::to_filter(&filter);
        assert_eq!(qdrant.must.len(), 2);
    }

    #[test]
    fn payload_round_trips_text_and_metadata() {
        let document = IndexedDocument {
            id: "a".into(),
            text: "Content:\nx".into(),
            metadata: [("state".to_string(), "ca".to_string())].into_iter().collect(),
            embedding: vec![0.5, 0.5],
        };
        let payload = QdrantVectorStore::to_payload(&document).unwrap();
        let map: HashMap<String, QdrantValue> = payload.into();
        let (text, metadata) = QdrantVectorStore::from_payload(&map);
        assert_eq!(text, "Content:\nx");
        assert_eq!(metadata.get("state").map(String::as_str), Some("ca"));
    }
}
