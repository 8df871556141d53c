//! Data types for ordinance records, indexed documents, and search results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata attached to an indexed ordinance. Never contains empty values.
pub type Metadata = BTreeMap<String, String>;

/// Marker separating the metadata header from the body of an indexed document.
pub const CONTENT_MARKER: &str = "Content:\n";

/// A single municipal ordinance section as produced by ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrdinanceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The ordinance text.
    pub content: String,
}

impl OrdinanceRecord {
    /// Create a record with the given content and no metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), ..Self::default() }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_chapter(mut self, chapter: impl Into<String>) -> Self {
        self.chapter = Some(chapter.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Build a record from a metadata map, as found in exported record files.
    /// Unknown keys are ignored.
    pub fn from_metadata(metadata: &Metadata, content: impl Into<String>) -> Self {
        let field = |key: &str| metadata.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            title: field("title"),
            chapter: field("chapter"),
            section: field("section"),
            subtitle: field("subtitle"),
            state: field("state"),
            city: field("city"),
            url: field("url"),
            content: content.into(),
        }
    }

    /// The metadata map stored alongside the indexed text. Empty and missing
    /// fields are omitted.
    pub fn metadata(&self) -> Metadata {
        [
            ("title", &self.title),
            ("chapter", &self.chapter),
            ("section", &self.section),
            ("subtitle", &self.subtitle),
            ("state", &self.state),
            ("city", &self.city),
            ("url", &self.url),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value.as_deref().filter(|v| !v.is_empty()).map(|v| (key.to_string(), v.to_string()))
        })
        .collect()
    }

    /// Render the record into the text blob that gets embedded and indexed.
    pub fn format(&self) -> String {
        let field = |value: &Option<String>| value.as_deref().unwrap_or_default().to_string();
        format!(
            "Title: {}\nChapter: {}\nSection: {}\nSubtitle: {}\n\n{CONTENT_MARKER}{}",
            field(&self.title),
            field(&self.chapter),
            field(&self.section),
            field(&self.subtitle),
            self.content,
        )
        .trim()
        .to_string()
    }
}

/// An [`OrdinanceRecord`] rendered for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedDocument {
    /// Opaque unique identifier.
    pub id: String,
    /// Formatted metadata header plus content body.
    pub text: String,
    /// Metadata used for filtering and returned as citation sources.
    pub metadata: Metadata,
    /// The vector embedding of `text`. Empty until embedded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl IndexedDocument {
    /// Render a record and assign it a fresh random id.
    pub fn from_record(record: &OrdinanceRecord) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: record.format(),
            metadata: record.metadata(),
            embedding: Vec::new(),
        }
    }
}

/// A document returned by a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: String,
    /// The full indexed text, header included.
    pub document: String,
    pub metadata: Metadata,
    /// `1 - distance`; higher is more relevant.
    pub relevance_score: f32,
}

/// A search result reduced to its content body and tagged with its rank.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedPassage {
    pub id: String,
    /// The content body, without the metadata header.
    pub body: String,
    pub metadata: Metadata,
    pub relevance_score: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// Introspection summary of a collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub document_count: usize,
    /// Collection-level settings reported by the backend.
    pub metadata: Metadata,
    /// Distinct `state` values, sorted.
    pub states: Vec<String>,
    /// Distinct `city` values, sorted.
    pub cities: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_renders_header_then_content() {
        let record = OrdinanceRecord::new("No open burning.")
            .with_title("TITLE 8, BUILDING REGULATIONS")
            .with_section("8.04.010");
        assert_eq!(
            record.format(),
            "Title: TITLE 8, BUILDING REGULATIONS\nChapter: \nSection: 8.04.010\nSubtitle: \n\nContent:\nNo open burning."
        );
    }

    #[test]
    fn metadata_omits_empty_fields() {
        let record = OrdinanceRecord::new("x").with_title("T1").with_city("").with_state("ca");
        let metadata = record.metadata();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get("title").map(String::as_str), Some("T1"));
        assert!(!metadata.contains_key("city"));
    }

    #[test]
    fn from_metadata_round_trips_known_fields() {
        let record = OrdinanceRecord::new("body").with_chapter("CHAPTER 1").with_url("https://x");
        let rebuilt = OrdinanceRecord::from_metadata(&record.metadata(), "body");
        assert_eq!(rebuilt, record);
    }

    #[test]
    fn indexed_documents_get_distinct_ids() {
        let record = OrdinanceRecord::new("same");
        let a = IndexedDocument::from_record(&record);
        let b = IndexedDocument::from_record(&record);
        assert_ne!(a.id, b.id);
        assert_eq!(a.text, b.text);
    }
}
