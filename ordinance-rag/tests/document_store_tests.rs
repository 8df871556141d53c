//! Integration tests for `DocumentStore` over the in-memory backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ordinance_rag::{
    BatchingEmbedder, DocumentStore, EmbeddingProvider, ErrorKind, FilterPredicate,
    HashingEmbedder, IndexedDocument, InMemoryVectorStore, OrdinanceRecord, RagConfig, RagError,
    Result, SearchResult, VectorStore,
};

async fn open(embedder: impl EmbeddingProvider + 'static) -> DocumentStore {
    DocumentStore::initialize(
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(embedder),
        "ordinances",
        true,
    )
    .await
    .unwrap()
}

fn fire_and_parking() -> Vec<OrdinanceRecord> {
    vec![
        OrdinanceRecord::new("fire code").with_title("T1").with_state("ca").with_city("campbell"),
        OrdinanceRecord::new("parking rules").with_title("T2").with_state("nv").with_city("reno"),
    ]
}

#[tokio::test]
async fn exact_text_query_returns_its_own_document_first() {
    let store = open(HashingEmbedder::default()).await;
    let records = vec![
        OrdinanceRecord::new("Open burning is prohibited within city limits.").with_title("T1"),
        OrdinanceRecord::new("Vehicles may not park overnight on Main Street.").with_title("T2"),
        OrdinanceRecord::new("Dogs must be leashed in public parks.").with_title("T3"),
    ];
    let ids = store.upsert(&records, 100).await.unwrap();
    assert_eq!(ids.len(), 3);

    let hits = store.search(&records[1].format(), 3, None).await.unwrap();
    assert_eq!(hits[0].id, ids[1]);
    assert!((hits[0].relevance_score - 1.0).abs() < 1e-5);
    assert!(hits.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score));
}

#[tokio::test]
async fn fire_query_finds_the_fire_code() {
    let store = open(HashingEmbedder::default()).await;
    store.upsert(&fire_and_parking(), 100).await.unwrap();

    let hits = store.search("fire", 1, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.get("title").map(String::as_str), Some("T1"));
    assert!(hits[0].document.ends_with("Content:\nfire code"));
}

#[tokio::test]
async fn filter_restricts_to_matching_jurisdiction() {
    let store = open(HashingEmbedder::default()).await;
    store.upsert(&fire_and_parking(), 100).await.unwrap();

    let filter = FilterPredicate::field("state", "nv");
    let hits = store.search("fire", 5, Some(&filter)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.get("title").map(String::as_str), Some("T2"));

    let nowhere = FilterPredicate::field("state", "nv").and("city", "campbell");
    assert!(store.search("fire", 5, Some(&nowhere)).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_filter_behaves_like_no_filter() {
    let store = open(HashingEmbedder::default()).await;
    store.upsert(&fire_and_parking(), 100).await.unwrap();

    let unfiltered = store.search("parking", 5, None).await.unwrap();
    let empty = store.search("parking", 5, Some(&FilterPredicate::new())).await.unwrap();
    assert_eq!(unfiltered, empty);
}

#[tokio::test]
async fn malformed_filter_is_a_store_error() {
    let store = open(HashingEmbedder::default()).await;
    store.upsert(&fire_and_parking(), 100).await.unwrap();

    let err = store.search("fire", 5, Some(&FilterPredicate::field("", "ca"))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);
}

#[tokio::test]
async fn zero_max_results_returns_nothing() {
    let store = open(HashingEmbedder::default()).await;
    store.upsert(&fire_and_parking(), 100).await.unwrap();
    assert!(store.search("fire", 0, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn searching_an_empty_collection_returns_nothing() {
    let store = open(HashingEmbedder::default()).await;
    assert!(store.search("fire", 5, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_with_duplicate_skipping_is_idempotent() {
    let store = open(HashingEmbedder::default()).await;
    let records = fire_and_parking();

    assert_eq!(store.update(&records, true).await.unwrap(), 2);
    assert_eq!(store.update(&records, true).await.unwrap(), 0);
    assert_eq!(store.info().await.unwrap().document_count, 2);

    let repeated = vec![records[0].clone(), records[0].clone()];
    let fresh = open(HashingEmbedder::default()).await;
    assert_eq!(fresh.update(&repeated, true).await.unwrap(), 1);
}

#[tokio::test]
async fn update_without_skipping_stores_duplicates() {
    let store = open(HashingEmbedder::default()).await;
    let records = fire_and_parking();
    store.update(&records, false).await.unwrap();
    store.update(&records, false).await.unwrap();
    assert_eq!(store.info().await.unwrap().document_count, 4);
}

#[tokio::test]
async fn zero_batch_size_is_rejected() {
    let store = open(HashingEmbedder::default()).await;
    let err = store.upsert(&fire_and_parking(), 0).await.unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));
}

#[tokio::test]
async fn records_without_content_are_rejected_before_writing() {
    let store = open(HashingEmbedder::default()).await;
    let records = vec![OrdinanceRecord::new("fire code"), OrdinanceRecord::new(" ").with_title("T9")];

    let err = store.upsert(&records, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingestion);
    assert!(matches!(err, RagError::Ingestion { batches_completed: 0, batches_total: 2, .. }));
    assert_eq!(store.info().await.unwrap().document_count, 0);
}

#[tokio::test]
async fn delete_removes_documents() {
    let store = open(HashingEmbedder::default()).await;
    let ids = store.upsert(&fire_and_parking(), 100).await.unwrap();
    store.delete(&[ids[0].as_str()]).await.unwrap();

    let hits = store.search("fire", 5, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, ids[1]);
}

#[tokio::test]
async fn info_lists_distinct_sorted_jurisdictions() {
    let store = open(HashingEmbedder::new(64)).await;
    let mut records = fire_and_parking();
    records.push(OrdinanceRecord::new("noise limits").with_state("ca").with_city("alameda"));
    store.upsert(&records, 2).await.unwrap();

    let info = store.info().await.unwrap();
    assert_eq!(info.name, "ordinances");
    assert_eq!(info.document_count, 3);
    assert_eq!(info.states, vec!["ca", "nv"]);
    assert_eq!(info.cities, vec!["alameda", "campbell", "reno"]);
    assert_eq!(info.metadata.get("dimensions").map(String::as_str), Some("64"));
    assert_eq!(info.metadata.get("distance").map(String::as_str), Some("cosine"));
}

#[tokio::test]
async fn reopening_with_different_dimensions_fails_unless_recreated() {
    let backend: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    DocumentStore::initialize(backend.clone(), Arc::new(HashingEmbedder::new(64)), "ordinances", true)
        .await
        .unwrap();

    let reused =
        DocumentStore::initialize(backend.clone(), Arc::new(HashingEmbedder::new(64)), "ordinances", false)
            .await;
    assert!(reused.is_ok());

    let mismatch =
        DocumentStore::initialize(backend.clone(), Arc::new(HashingEmbedder::new(32)), "ordinances", false)
            .await;
    assert_eq!(mismatch.err().map(|e| e.kind()), Some(ErrorKind::Store));

    let rebuilt =
        DocumentStore::initialize(backend, Arc::new(HashingEmbedder::new(32)), "ordinances", true).await;
    assert!(rebuilt.is_ok());
}

#[tokio::test]
async fn force_recreate_discards_previous_documents() {
    let backend: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let first =
        DocumentStore::initialize(backend.clone(), Arc::new(HashingEmbedder::default()), "ordinances", true)
            .await
            .unwrap();
    first.upsert(&fire_and_parking(), 100).await.unwrap();

    let second =
        DocumentStore::initialize(backend, Arc::new(HashingEmbedder::default()), "ordinances", true)
            .await
            .unwrap();
    assert_eq!(second.info().await.unwrap().document_count, 0);
}

/// A backend whose `fail_on`-th upsert call (0-based) fails.
struct FailingBackend {
    inner: InMemoryVectorStore,
    calls: AtomicUsize,
    fail_on: usize,
}

#[async_trait]
impl VectorStore for FailingBackend {
    fn backend(&self) -> &str {
        "failing"
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        self.inner.create_collection(name, dimensions).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner.delete_collection(name).await
    }

    async fn collection_dimensions(&self, name: &str) -> Result<Option<usize>> {
        self.inner.collection_dimensions(name).await
    }

    async fn upsert(&self, collection: &str, documents: &[IndexedDocument]) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(RagError::Store { backend: "failing".into(), message: "disk full".into() });
        }
        self.inner.upsert(collection, documents).await
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        self.inner.delete(collection, ids).await
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<SearchResult>> {
        self.inner.search(collection, embedding, top_k, filter).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<IndexedDocument>> {
        self.inner.list(collection).await
    }
}

#[tokio::test]
async fn failed_batch_reports_progress_and_keeps_earlier_batches() {
    let backend = Arc::new(FailingBackend {
        inner: InMemoryVectorStore::new(),
        calls: AtomicUsize::new(0),
        fail_on: 2,
    });
    let store =
        DocumentStore::initialize(backend, Arc::new(HashingEmbedder::default()), "ordinances", true)
            .await
            .unwrap();

    let records: Vec<OrdinanceRecord> =
        (0..5).map(|i| OrdinanceRecord::new(format!("section {i}"))).collect();
    let err = store.upsert(&records, 2).await.unwrap_err();

    match err {
        RagError::Ingestion { batches_completed, batches_total, .. } => {
            assert_eq!(batches_completed, 2);
            assert_eq!(batches_total, 3);
        }
        other => panic!("expected an ingestion error, got {other:?}"),
    }
    assert_eq!(store.info().await.unwrap().document_count, 4);
}

/// Hashing embedder that refuses any batch mentioning "unlucky".
struct Unreliable(HashingEmbedder);

#[async_trait]
impl EmbeddingProvider for Unreliable {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.0.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("unlucky")) {
            return Err(RagError::Embedding { provider: "unreliable".into(), message: "429".into() });
        }
        self.0.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.0.dimensions()
    }
}

#[tokio::test]
async fn zero_vector_fallback_keeps_ingesting_without_dominating_search() {
    let embedder = Arc::new(BatchingEmbedder::with_batch_size(Unreliable(HashingEmbedder::default()), 1));
    let store = DocumentStore::initialize(
        Arc::new(InMemoryVectorStore::new()),
        embedder.clone(),
        "ordinances",
        true,
    )
    .await
    .unwrap();

    let records = vec![
        OrdinanceRecord::new("fire code").with_title("T1"),
        OrdinanceRecord::new("unlucky fire fire fire").with_title("T2"),
    ];
    let ids = store.upsert(&records, 100).await.unwrap();
    assert_eq!(ids.len(), 2);

    let stats = embedder.stats();
    assert_eq!(stats.fallback_batches, 1);
    assert_eq!(stats.fallback_texts, 1);

    let hits = store.search("fire", 2, None).await.unwrap();
    assert_eq!(hits[0].id, ids[0]);
    assert!(hits[0].relevance_score > 0.0);
    assert_eq!(hits[1].id, ids[1]);
    assert!(hits[1].relevance_score.abs() < 1e-6);
}

/// Two-dimensional embeddings picked per text; batches mentioning
/// "unlucky" fail.
struct Scripted;

#[async_trait]
impl EmbeddingProvider for Scripted {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("unlucky") {
            return Err(RagError::Embedding { provider: "scripted".into(), message: "503".into() });
        }
        // Queries point along x; the one stored section points mostly away.
        Ok(if text.contains("Content:") { vec![-0.1, 1.0] } else { vec![1.0, 0.0] })
    }

    fn dimensions(&self) -> usize {
        2
    }
}

#[tokio::test]
async fn fallback_documents_rank_below_negatively_scored_matches() {
    let store = open(BatchingEmbedder::with_batch_size(Scripted, 1)).await;
    let ids = store
        .upsert(
            &[
                OrdinanceRecord::new("front setback of twenty feet").with_title("T1"),
                OrdinanceRecord::new("unlucky rear setback").with_title("T2"),
            ],
            100,
        )
        .await
        .unwrap();

    let hits = store.search("setback", 1, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, ids[0]);
    assert!(hits[0].relevance_score < 0.0);

    let hits = store.search("setback", 2, None).await.unwrap();
    assert_eq!(hits[1].id, ids[1]);
}

#[tokio::test]
async fn configured_batch_sizes_reach_embedder_and_backend() {
    let config = RagConfig::builder()
        .collection_name("reno")
        .upsert_batch_size(2)
        .embedding_batch_size(1)
        .build()
        .unwrap();
    let backend = Arc::new(FailingBackend {
        inner: InMemoryVectorStore::new(),
        calls: AtomicUsize::new(0),
        fail_on: usize::MAX,
    });
    let embedder = Arc::new(BatchingEmbedder::with_batch_size(
        HashingEmbedder::default(),
        config.embedding_batch_size,
    ));
    let store = DocumentStore::from_config(backend.clone(), embedder.clone(), &config, true)
        .await
        .unwrap();
    assert_eq!(store.name(), "reno");

    let records: Vec<OrdinanceRecord> =
        (0..3).map(|i| OrdinanceRecord::new(format!("section {i}"))).collect();
    assert_eq!(store.update(&records, true).await.unwrap(), 3);

    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert_eq!(embedder.stats().batches, 3);
}
