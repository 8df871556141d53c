//! Assembling the query service from a [`ServerConfig`].

use std::sync::Arc;

use anyhow::Context;
use ordinance_rag::openai::OpenAICompatibleCompletion;
use ordinance_rag::together::TogetherEmbeddingProvider;
use ordinance_rag::{
    BatchingEmbedder, CompletionConfig, CompletionEngine, DocumentStore, EmbeddingProvider,
    HashingEmbedder, InMemoryVectorStore, OrdinanceRag, RagConfig, VectorStore, ingest_directory,
};
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Dimensions of the offline hashing embedder when none are configured.
const HASHING_DIMENSIONS: usize = 256;

/// Retrieval and ingestion settings.
pub fn rag_config(config: &ServerConfig) -> anyhow::Result<RagConfig> {
    let rag = RagConfig::builder()
        .collection_name(&config.collection)
        .top_k(config.top_k)
        .upsert_batch_size(config.upsert_batch_size)
        .embedding_batch_size(config.embedding_batch_size)
        .build()?;
    Ok(rag)
}

/// The vector store backend: Qdrant when a URL is configured, memory otherwise.
pub fn build_backend(config: &ServerConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    match &config.qdrant_url {
        #[cfg(feature = "qdrant")]
        Some(url) => {
            let store = ordinance_rag::qdrant::QdrantVectorStore::new(url)
                .with_context(|| format!("connecting to qdrant at {url}"))?;
            info!(url = %url, "using qdrant backend");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "qdrant"))]
        Some(_) => anyhow::bail!("ORDINANCE_QDRANT_URL is set but the `qdrant` feature is disabled"),
        None => {
            info!("using in-memory backend");
            Ok(Arc::new(InMemoryVectorStore::new()))
        }
    }
}

/// The embedding provider: Together when an API key is configured, the
/// offline hashing embedder otherwise.
pub fn build_embedder(
    config: &ServerConfig,
    rag: &RagConfig,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let Some(api_key) = &config.together_api_key else {
        let dimensions = config.embedding_dimensions.unwrap_or(HASHING_DIMENSIONS);
        warn!(dimensions, "TOGETHER_API_KEY not set, using the offline hashing embedder");
        return Ok(Arc::new(HashingEmbedder::new(dimensions)));
    };

    let mut provider = TogetherEmbeddingProvider::new(api_key.clone())?;
    if let Some(model) = &config.embedding_model {
        provider = provider.with_model(model.clone());
    }
    if let Some(dimensions) = config.embedding_dimensions {
        provider = provider.with_dimensions(dimensions);
    }
    info!(
        dimensions = provider.dimensions(),
        batch_size = rag.embedding_batch_size,
        "using Together embeddings"
    );
    Ok(Arc::new(BatchingEmbedder::with_batch_size(provider, rag.embedding_batch_size)))
}

/// Settings for the chat model.
pub fn completion_config(config: &ServerConfig) -> CompletionConfig {
    let completion = CompletionConfig::new(&config.llm_base_url, &config.llm_model);
    match &config.llm_api_key {
        Some(api_key) => completion.with_api_key(api_key.clone()),
        None => completion,
    }
}

/// The chat completion client.
pub fn build_completion(completion: CompletionConfig) -> anyhow::Result<Arc<dyn CompletionEngine>> {
    let engine = OpenAICompatibleCompletion::new(completion).context("configuring completion")?;
    Ok(Arc::new(engine))
}

/// Open the configured collection.
///
/// With a data directory, the collection is rebuilt from its exports;
/// otherwise an existing collection is reused (or created empty).
pub async fn build_store(config: &ServerConfig, rag: &RagConfig) -> anyhow::Result<Arc<DocumentStore>> {
    let backend = build_backend(config)?;
    let embedder = build_embedder(config, rag)?;

    let store = match &config.data_dir {
        Some(dir) => {
            let (store, report) = ingest_directory(
                backend,
                embedder,
                dir,
                &rag.collection_name,
                rag.upsert_batch_size,
            )
            .await
            .with_context(|| format!("loading exports from {}", dir.display()))?;
            info!(documents = report.info.document_count, "collection loaded from exports");
            store
        }
        None => DocumentStore::from_config(backend, embedder, rag, false)
            .await
            .with_context(|| format!("opening collection {}", rag.collection_name))?,
    };
    Ok(Arc::new(store))
}

/// The full query facade.
pub async fn build_rag(config: &ServerConfig) -> anyhow::Result<OrdinanceRag> {
    let rag_config = rag_config(config)?;
    let completion = completion_config(config);
    let system_prompt = completion.system_prompt.clone();

    let rag = OrdinanceRag::builder()
        .store(build_store(config, &rag_config).await?)
        .config(rag_config)
        .completion(build_completion(completion)?)
        .system_prompt(system_prompt)
        .build()?;
    Ok(rag)
}
