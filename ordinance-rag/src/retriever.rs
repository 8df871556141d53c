//! Turns store hits into ranked passages.

use std::sync::Arc;

use tracing::debug;

use crate::document::{CONTENT_MARKER, RankedPassage, SearchResult};
use crate::error::Result;
use crate::filter::FilterPredicate;
use crate::store::DocumentStore;

/// Retrieves passages from a [`DocumentStore`].
///
/// Ordering is whatever the store returned (descending relevance). No
/// re-ranking or extra de-duplication happens here.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<DocumentStore>,
}

impl Retriever {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Search for `query` and return up to `top_k` passages with the
    /// metadata header stripped.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<RankedPassage>> {
        let results = self.store.search(query, top_k, filter).await?;
        let passages: Vec<RankedPassage> =
            results.into_iter().enumerate().map(|(i, r)| to_passage(i + 1, r)).collect();
        debug!(query_len = query.len(), passages = passages.len(), "retrieved passages");
        Ok(passages)
    }
}

/// The text after the first content marker, or the whole text when the
/// marker is absent.
pub fn strip_header(document: &str) -> &str {
    document.split_once(CONTENT_MARKER).map_or(document, |(_, body)| body)
}

fn to_passage(rank: usize, result: SearchResult) -> RankedPassage {
    RankedPassage {
        body: strip_header(&result.document).to_string(),
        id: result.id,
        metadata: result.metadata,
        relevance_score: result.relevance_score,
        rank,
    }
}
