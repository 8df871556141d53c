//! Query orchestration: retrieve → assemble → complete.
//!
//! [`OrdinanceRag`] answers a [`QueryRequest`] either in one blocking call
//! ([`answer`](OrdinanceRag::answer)) or as a stream of [`QueryEvent`]s
//! ([`answer_stream`](OrdinanceRag::answer_stream)) whose first event always
//! carries the citation sources.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ordinance_rag::{OrdinanceRag, QueryRequest, RagConfig};
//!
//! let rag = OrdinanceRag::builder()
//!     .config(RagConfig::default())
//!     .store(store)
//!     .completion(Arc::new(engine))
//!     .build()?;
//!
//! let answer = rag.answer(&QueryRequest::new("Where can I park an RV?").with_state("ca")).await?;
//! ```

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::completion::CompletionEngine;
use crate::config::{DEFAULT_SYSTEM_PROMPT, RagConfig};
use crate::context::{ContextAssembler, build_prompt};
use crate::document::{Metadata, RankedPassage};
use crate::error::{RagError, Result};
use crate::filter::FilterPredicate;
use crate::retriever::Retriever;
use crate::store::DocumentStore;

/// A user question with optional jurisdiction filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Extra equality clauses over metadata keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_conditions: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub stream: bool,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Self::default() }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_condition(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter_conditions.get_or_insert_with(BTreeMap::new).insert(key.into(), value.into());
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// # Errors
    ///
    /// Returns [`RagError::Validation`] if the query is blank.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(RagError::Validation("query must not be empty".into()));
        }
        Ok(())
    }

    /// The conjunction of `filter_conditions` (in key order) with the
    /// `state` and `city` clauses. Explicit `state`/`city` replace
    /// same-named condition keys; blank values are ignored.
    pub fn filter(&self) -> FilterPredicate {
        let explicit = [("state", &self.state), ("city", &self.city)];
        let overridden = |key: &str| explicit.iter().any(|(k, v)| *k == key && present(v));

        let conditions = self
            .filter_conditions
            .iter()
            .flatten()
            .filter(|(key, _)| !overridden(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()));

        let jurisdiction = explicit
            .iter()
            .filter(|(_, v)| present(v))
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())));

        conditions.chain(jurisdiction).collect()
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// The blocking answer and the metadata of every passage it was based on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub response: String,
    pub sources: Vec<Metadata>,
}

/// One element of a streamed answer.
///
/// Serializes as `{"type": "sources", "content": [...]}` or
/// `{"type": "content", "content": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum QueryEvent {
    Sources(Vec<Metadata>),
    Content(String),
}

/// A stream of [`QueryEvent`]s. Dropping it cancels the upstream completion.
pub type QueryEventStream = Pin<Box<dyn Stream<Item = Result<QueryEvent>> + Send>>;

/// A user-facing failure: a generic message plus the internal detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryFailure {
    pub error: String,
    pub detail: String,
}

impl From<&RagError> for QueryFailure {
    fn from(err: &RagError) -> Self {
        Self { error: err.user_message().to_string(), detail: err.to_string() }
    }
}

/// The retrieval-augmented question answering facade.
///
/// Cheap to clone; all components are shared.
#[derive(Clone)]
pub struct OrdinanceRag {
    config: RagConfig,
    retriever: Retriever,
    assembler: ContextAssembler,
    completion: Arc<dyn CompletionEngine>,
    system_prompt: Arc<str>,
}

impl OrdinanceRag {
    /// Create a new [`OrdinanceRagBuilder`].
    pub fn builder() -> OrdinanceRagBuilder {
        OrdinanceRagBuilder::default()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        self.retriever.store()
    }

    /// Retrieve passages and build the prompt for `request`.
    async fn prepare(&self, request: &QueryRequest) -> Result<(Vec<RankedPassage>, String)> {
        request.validate()?;
        let filter = request.filter();
        let passages = self.retriever.retrieve(&request.query, self.config.top_k, Some(&filter)).await?;
        let context = self.assembler.assemble(&passages);
        debug!(passages = passages.len(), context_len = context.len(), "assembled context");
        Ok((passages, build_prompt(&context, &request.query)))
    }

    /// Answer `request` in one call.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for a blank query, or whatever the
    /// store or completion engine failed with.
    pub async fn answer(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let (passages, prompt) = self.prepare(request).await.inspect_err(|e| {
            error!(error = %e, "query preparation failed");
        })?;

        let response = self.completion.complete(&self.system_prompt, &prompt).await.inspect_err(|e| {
            error!(model = self.completion.model(), error = %e, "completion failed");
        })?;

        info!(sources = passages.len(), answer_len = response.len(), "query answered");
        Ok(QueryResponse { response, sources: sources(&passages) })
    }

    /// Answer `request` as a stream.
    ///
    /// The first item is always [`QueryEvent::Sources`] (possibly empty),
    /// followed by one [`QueryEvent::Content`] per upstream chunk in arrival
    /// order. An error ends the stream; events already yielded stand.
    ///
    /// Nothing happens until the stream is polled. Chunks are pulled from
    /// the model one at a time as the consumer asks for them.
    pub fn answer_stream(&self, request: QueryRequest) -> QueryEventStream {
        let this = self.clone();

        let stream = try_stream! {
            let (passages, prompt) = this.prepare(&request).await.inspect_err(|e| {
                error!(error = %e, "query preparation failed");
            })?;

            yield QueryEvent::Sources(sources(&passages));

            let mut chunks = this.completion.stream_complete(&this.system_prompt, &prompt).await?;
            let mut delivered = 0usize;
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.inspect_err(|e| {
                    error!(delivered, error = %e, "completion stream failed");
                })?;
                delivered += 1;
                yield QueryEvent::Content(chunk);
            }

            info!(sources = passages.len(), chunks = delivered, "streamed query answered");
        };

        Box::pin(stream)
    }
}

fn sources(passages: &[RankedPassage]) -> Vec<Metadata> {
    passages.iter().map(|p| p.metadata.clone()).collect()
}

/// Builder for constructing an [`OrdinanceRag`].
///
/// `store` and `completion` are required; `config` defaults to
/// [`RagConfig::default`] and the system prompt to the ordinance persona.
#[derive(Default)]
pub struct OrdinanceRagBuilder {
    config: Option<RagConfig>,
    store: Option<Arc<DocumentStore>>,
    completion: Option<Arc<dyn CompletionEngine>>,
    system_prompt: Option<String>,
}

impl OrdinanceRagBuilder {
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn store(mut self, store: Arc<DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn completion(mut self, completion: Arc<dyn CompletionEngine>) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Build the [`OrdinanceRag`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if any required field is missing, or if
    /// an explicit config names a different collection than the store holds.
    pub fn build(self) -> Result<OrdinanceRag> {
        let store =
            self.store.ok_or_else(|| RagError::Config("store is required".to_string()))?;
        let config = match self.config {
            Some(config) if config.collection_name != store.name() => {
                return Err(RagError::Config(format!(
                    "config names collection '{}' but the store holds '{}'",
                    config.collection_name,
                    store.name()
                )));
            }
            Some(config) => config,
            None => RagConfig { collection_name: store.name().to_string(), ..RagConfig::default() },
        };
        let completion = self
            .completion
            .ok_or_else(|| RagError::Config("completion engine is required".to_string()))?;

        let assembler = match config.max_context_chars {
            Some(cap) => ContextAssembler::with_max_chars(cap),
            None => ContextAssembler::new(),
        };
        let system_prompt = self.system_prompt.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(OrdinanceRag {
            config,
            retriever: Retriever::new(store),
            assembler,
            completion,
            system_prompt: system_prompt.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_query_is_invalid() {
        let err = QueryRequest::new("   ").validate().unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[test]
    fn filter_combines_conditions_then_jurisdiction() {
        let request = QueryRequest::new("q")
            .with_condition("title", "TITLE 8")
            .with_condition("chapter", "CHAPTER 2")
            .with_state("ca")
            .with_city("campbell");
        let filter = request.filter();
        let clauses: Vec<(&str, &str)> =
            filter.clauses().iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            clauses,
            vec![("chapter", "CHAPTER 2"), ("title", "TITLE 8"), ("state", "ca"), ("city", "campbell")]
        );
    }

    #[test]
    fn explicit_state_overrides_condition() {
        let request = QueryRequest::new("q").with_condition("state", "nv").with_state("ca");
        assert_eq!(request.filter(), FilterPredicate::field("state", "ca"));
    }

    #[test]
    fn blank_jurisdiction_is_ignored() {
        let request = QueryRequest::new("q").with_state("").with_condition("state", "nv");
        assert_eq!(request.filter(), FilterPredicate::field("state", "nv"));
    }

    #[test]
    fn events_serialize_with_type_tags() {
        let sources = QueryEvent::Sources(vec![[("title".to_string(), "T1".to_string())].into()]);
        assert_eq!(
            serde_json::to_value(&sources).unwrap(),
            serde_json::json!({"type": "sources", "content": [{"title": "T1"}]})
        );
        assert_eq!(
            serde_json::to_value(QueryEvent::Content("Hi".into())).unwrap(),
            serde_json::json!({"type": "content", "content": "Hi"})
        );
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: QueryRequest = serde_json::from_str(r#"{"query": "fire"}"#).unwrap();
        assert_eq!(request, QueryRequest::new("fire"));
        assert!(!request.stream);
    }
}
