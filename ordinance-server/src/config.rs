//! Service configuration read from the environment.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use ordinance_rag::{DEFAULT_COLLECTION, DEFAULT_COMPLETION_MODEL, DEFAULT_UPSERT_BATCH_SIZE, RagConfig};

const DEFAULT_LLM_BASE_URL: &str = "http://localhost:5050/v1";

/// Everything the `ordinance` binary needs to assemble a service.
///
/// Read with [`ServerConfig::from_env`]; command-line flags override
/// individual fields afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub collection: String,
    pub top_k: usize,
    /// Documents written per store batch.
    pub upsert_batch_size: usize,
    /// Texts sent per embedding request.
    pub embedding_batch_size: usize,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    /// Selects the Together embeddings API. Without it, the offline hashing
    /// embedder is used.
    pub together_api_key: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<usize>,
    /// Selects the Qdrant backend. Without it, documents live in memory.
    pub qdrant_url: Option<String>,
    /// Export directory loaded into the collection at startup.
    pub data_dir: Option<PathBuf>,
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            collection: DEFAULT_COLLECTION.to_string(),
            top_k: 5,
            upsert_batch_size: DEFAULT_UPSERT_BATCH_SIZE,
            embedding_batch_size: RagConfig::default().embedding_batch_size,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: DEFAULT_COMPLETION_MODEL.to_string(),
            llm_api_key: None,
            together_api_key: None,
            embedding_model: None,
            embedding_dimensions: None,
            qdrant_url: None,
            data_dir: None,
            log_json: false,
        }
    }
}

impl ServerConfig {
    /// Load `.env` (if present) and read `ORDINANCE_*` variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup. Unset and blank
    /// variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Ok(Self {
            host: var("ORDINANCE_HOST").unwrap_or(defaults.host),
            port: parse(&var, "ORDINANCE_PORT")?.unwrap_or(defaults.port),
            collection: var("ORDINANCE_COLLECTION").unwrap_or(defaults.collection),
            top_k: parse(&var, "ORDINANCE_TOP_K")?.unwrap_or(defaults.top_k),
            upsert_batch_size: parse(&var, "ORDINANCE_UPSERT_BATCH_SIZE")?
                .unwrap_or(defaults.upsert_batch_size),
            embedding_batch_size: parse(&var, "ORDINANCE_EMBEDDING_BATCH_SIZE")?
                .unwrap_or(defaults.embedding_batch_size),
            llm_base_url: var("ORDINANCE_LLM_BASE_URL").unwrap_or(defaults.llm_base_url),
            llm_model: var("ORDINANCE_LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_api_key: var("ORDINANCE_LLM_API_KEY"),
            together_api_key: var("TOGETHER_API_KEY"),
            embedding_model: var("ORDINANCE_EMBEDDING_MODEL"),
            embedding_dimensions: parse(&var, "ORDINANCE_EMBEDDING_DIMENSIONS")?,
            qdrant_url: var("ORDINANCE_QDRANT_URL"),
            data_dir: var("ORDINANCE_DATA_DIR").map(PathBuf::from),
            log_json: var("ORDINANCE_LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key).map(|v| v.parse::<T>().with_context(|| format!("invalid {key}: {v:?}"))).transpose()
}
