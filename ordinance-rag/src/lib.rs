//! # ordinance-rag
//!
//! Retrieval-augmented question answering over municipal ordinances.
//!
//! Ordinance sections are rendered into documents, embedded, and stored in a
//! vector collection. Questions are answered by retrieving the closest
//! sections (optionally restricted by state, city, or any other metadata
//! field), assembling them into a prompt, and asking an LLM.
//!
//! ## Components
//!
//! - [`DocumentStore`]: one embedded collection over a [`VectorStore`] backend
//! - [`Retriever`]: ranked passages with the rendering header stripped
//! - [`ContextAssembler`]: joins passages into the prompt context
//! - [`CompletionEngine`]: blocking or streamed chat completion
//! - [`OrdinanceRag`]: the query facade tying the above together
//! - [`ingest`]: loading spreadsheet exports from disk
//!
//! ## Feature Flags
//!
//! | Feature    | Enables                                  |
//! |------------|------------------------------------------|
//! | `together` | `TogetherEmbeddingProvider`              |
//! | `openai`   | `OpenAICompatibleCompletion`             |
//! | `qdrant`   | `QdrantVectorStore`                      |
//! | `full`     | all of the above                         |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ordinance_rag::*;
//!
//! let store = DocumentStore::initialize(
//!     Arc::new(InMemoryVectorStore::new()),
//!     Arc::new(HashingEmbedder::default()),
//!     DEFAULT_COLLECTION,
//!     true,
//! )
//! .await?;
//! store.upsert(&[OrdinanceRecord::new("No parking on Main St.").with_state("ca")], 100).await?;
//!
//! let rag = OrdinanceRag::builder().store(Arc::new(store)).completion(engine).build()?;
//! let answer = rag.answer(&QueryRequest::new("Where can I park?").with_state("ca")).await?;
//! ```

pub mod completion;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod hashing;
pub mod ingest;
pub mod inmemory;
pub mod rag;
pub mod retriever;
pub mod store;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "qdrant")]
pub mod qdrant;

#[cfg(feature = "together")]
pub mod together;

pub use completion::{ChatMessage, ChunkStream, CompletionEngine, Role};
pub use config::{
    CompletionConfig, DEFAULT_COLLECTION, DEFAULT_COMPLETION_MODEL, DEFAULT_SYSTEM_PROMPT,
    RagConfig, RagConfigBuilder,
};
pub use context::{ContextAssembler, assemble, build_prompt};
pub use document::{
    CONTENT_MARKER, CollectionInfo, IndexedDocument, Metadata, OrdinanceRecord, RankedPassage,
    SearchResult,
};
pub use embedding::{BatchingEmbedder, EmbeddingProvider, EmbeddingStats};
pub use error::{ErrorKind, RagError, Result};
pub use filter::FilterPredicate;
pub use hashing::HashingEmbedder;
pub use ingest::{FileOutcome, IngestReport, SpreadsheetRow, ingest_directory, load_export};
pub use inmemory::InMemoryVectorStore;
pub use rag::{
    OrdinanceRag, OrdinanceRagBuilder, QueryEvent, QueryEventStream, QueryFailure, QueryRequest,
    QueryResponse,
};
pub use retriever::{Retriever, strip_header};
pub use store::{DEFAULT_UPSERT_BATCH_SIZE, DocumentStore};
pub use vectorstore::VectorStore;
