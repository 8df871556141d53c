//! The ordinance document store.
//!
//! [`DocumentStore`] binds one named collection in a [`VectorStore`] backend
//! to one [`EmbeddingProvider`]. It renders [`OrdinanceRecord`]s into
//! [`IndexedDocument`]s, writes them in batches, and answers filtered
//! similarity searches.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ordinance_rag::{DocumentStore, HashingEmbedder, InMemoryVectorStore};
//!
//! let store = DocumentStore::initialize(
//!     Arc::new(InMemoryVectorStore::new()),
//!     Arc::new(HashingEmbedder::default()),
//!     "ordinances",
//!     true,
//! )
//! .await?;
//! store.upsert(&records, 100).await?;
//! let hits = store.search("fire code", 5, None).await?;
//! ```

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::RagConfig;
use crate::document::{CollectionInfo, IndexedDocument, Metadata, OrdinanceRecord, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::filter::FilterPredicate;
use crate::vectorstore::VectorStore;

/// Default number of documents written per backend call.
pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 100;

/// A named ordinance collection with its embedding provider.
pub struct DocumentStore {
    name: String,
    backend: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    /// Serializes ingestion so duplicate checks and writes do not interleave.
    write_lock: Mutex<()>,
}

impl DocumentStore {
    /// Open the collection `name`, creating it if needed.
    ///
    /// With `force_recreate`, any existing collection of that name is dropped
    /// first. Otherwise an existing collection is reused.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Store`] if the backend fails, or if an existing
    /// collection was built with a different dimensionality than `embedder`
    /// produces.
    pub async fn initialize(
        backend: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        name: impl Into<String>,
        force_recreate: bool,
    ) -> Result<Self> {
        let name = name.into();
        let dimensions = embedder.dimensions();

        if force_recreate {
            backend.delete_collection(&name).await.inspect_err(|e| {
                error!(collection = %name, error = %e, "failed to drop collection");
            })?;
            info!(collection = %name, "dropped collection for fresh rebuild");
        } else if let Some(existing) = backend.collection_dimensions(&name).await? {
            if existing != dimensions {
                error!(collection = %name, existing, dimensions, "embedding dimension mismatch");
                return Err(RagError::store(
                    backend.backend(),
                    format!(
                        "collection '{name}' holds {existing}-dimensional vectors but the \
                         embedding provider '{}' produces {dimensions}",
                        embedder.name()
                    ),
                ));
            }
            debug!(collection = %name, "reusing existing collection");
        }

        backend.create_collection(&name, dimensions).await?;
        info!(collection = %name, dimensions, backend = backend.backend(), "document store ready");

        Ok(Self {
            name,
            backend,
            embedder,
            batch_size: DEFAULT_UPSERT_BATCH_SIZE,
            write_lock: Mutex::new(()),
        })
    }

    /// Open `config.collection_name`, writing in batches of
    /// `config.upsert_batch_size` on [`update`](Self::update).
    pub async fn from_config(
        backend: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RagConfig,
        force_recreate: bool,
    ) -> Result<Self> {
        Ok(Self::initialize(backend, embedder, config.collection_name.as_str(), force_recreate)
            .await?
            .with_batch_size(config.upsert_batch_size))
    }

    /// Set the batch size used by [`update`](Self::update).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Format, embed, and write `records` in batches of `batch_size`.
    ///
    /// Every record gets a fresh id; the ids are returned in input order.
    /// Batches are written in order and the first failure aborts the rest.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for a zero `batch_size`,
    /// [`RagError::Ingestion`] before writing anything if a record has blank
    /// content, and [`RagError::Ingestion`] naming how many batches were
    /// written before a failure.
    pub async fn upsert(&self, records: &[OrdinanceRecord], batch_size: usize) -> Result<Vec<String>> {
        let _guard = self.write_lock.lock().await;
        self.upsert_locked(records, batch_size).await
    }

    async fn upsert_locked(
        &self,
        records: &[OrdinanceRecord],
        batch_size: usize,
    ) -> Result<Vec<String>> {
        if batch_size == 0 {
            return Err(RagError::Validation("batch_size must be greater than zero".into()));
        }

        let batches_total = records.len().div_ceil(batch_size);
        if let Some(position) = records.iter().position(|r| r.content.trim().is_empty()) {
            return Err(RagError::Ingestion {
                message: format!("record {position} has no content"),
                batches_completed: 0,
                batches_total,
            });
        }

        let mut ids = Vec::with_capacity(records.len());

        for (index, batch) in records.chunks(batch_size).enumerate() {
            let fail = |message: String| RagError::Ingestion {
                message,
                batches_completed: index,
                batches_total,
            };

            let mut documents: Vec<IndexedDocument> =
                batch.iter().map(IndexedDocument::from_record).collect();
            let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();

            let embeddings = self.embedder.embed_batch(&texts).await.map_err(|e| {
                error!(collection = %self.name, batch = index, error = %e, "embedding failed during ingestion");
                fail(format!("embedding failed: {e}"))
            })?;
            if embeddings.len() != documents.len() {
                return Err(fail(format!(
                    "embedding provider returned {} vectors for {} documents",
                    embeddings.len(),
                    documents.len()
                )));
            }
            for (document, embedding) in documents.iter_mut().zip(embeddings) {
                document.embedding = embedding;
            }

            self.backend.upsert(&self.name, &documents).await.map_err(|e| {
                error!(collection = %self.name, batch = index, error = %e, "upsert failed during ingestion");
                fail(format!("upsert failed: {e}"))
            })?;

            debug!(collection = %self.name, batch = index, size = documents.len(), "wrote batch");
            ids.extend(documents.into_iter().map(|d| d.id));
        }

        info!(collection = %self.name, documents = ids.len(), batches = batches_total, "upserted records");
        Ok(ids)
    }

    /// Add `records` to the collection.
    ///
    /// With `skip_duplicates`, any record whose formatted text exactly
    /// matches a stored document (or an earlier record in the same call) is
    /// dropped first. This scans the whole collection.
    ///
    /// Returns the number of records written.
    pub async fn update(&self, records: &[OrdinanceRecord], skip_duplicates: bool) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        if !skip_duplicates {
            return Ok(self.upsert_locked(records, self.batch_size).await?.len());
        }

        let mut seen: HashSet<String> =
            self.backend.list(&self.name).await?.into_iter().map(|d| d.text).collect();
        let fresh: Vec<OrdinanceRecord> =
            records.iter().filter(|r| seen.insert(r.format())).cloned().collect();

        let skipped = records.len() - fresh.len();
        if skipped > 0 {
            info!(collection = %self.name, skipped, "skipped duplicate records");
        }

        Ok(self.upsert_locked(&fresh, self.batch_size).await?.len())
    }

    /// Remove documents by id.
    pub async fn delete(&self, ids: &[&str]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.backend.delete(&self.name, ids).await
    }

    /// Find up to `max_results` documents most similar to `query`, restricted
    /// to those matching `filter`.
    ///
    /// An empty filter behaves exactly like no filter.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<SearchResult>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }
        if let Some(filter) = filter {
            filter.validate()?;
        }
        let filter = filter.filter(|f| !f.is_empty());

        let embedding = self.embedder.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during search");
            e
        })?;

        let results =
            self.backend.search(&self.name, &embedding, max_results, filter).await.map_err(|e| {
                error!(collection = %self.name, error = %e, "vector store search failed");
                e
            })?;

        debug!(
            collection = %self.name,
            filter = %filter.map(|f| f.to_where()).unwrap_or_default(),
            hits = results.len(),
            "search completed"
        );
        Ok(results)
    }

    /// Summarize the collection by scanning all stored metadata.
    ///
    /// This is O(collection size) and meant for operational use.
    pub async fn info(&self) -> Result<CollectionInfo> {
        let documents = self.backend.list(&self.name).await?;

        let mut states = BTreeSet::new();
        let mut cities = BTreeSet::new();
        for document in &documents {
            if let Some(state) = document.metadata.get("state") {
                states.insert(state.clone());
            }
            if let Some(city) = document.metadata.get("city") {
                cities.insert(city.clone());
            }
        }

        let metadata: Metadata = [
            ("backend".to_string(), self.backend.backend().to_string()),
            ("distance".to_string(), "cosine".to_string()),
            ("dimensions".to_string(), self.embedder.dimensions().to_string()),
            ("embedding_provider".to_string(), self.embedder.name().to_string()),
        ]
        .into_iter()
        .collect();

        Ok(CollectionInfo {
            name: self.name.clone(),
            document_count: documents.len(),
            metadata,
            states: states.into_iter().collect(),
            cities: cities.into_iter().collect(),
        })
    }
}
