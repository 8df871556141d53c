//! Loading spreadsheet exports into a [`DocumentStore`].
//!
//! Exports are JSON files in one of two shapes:
//!
//! - **records**: `[{"metadata": {"title": .., "state": ..}, "content": ".."}]`
//! - **rows**: `[{"Title": .., "Subtitle": .., "Url": .., "Content": ..}]`, the
//!   raw spreadsheet rows. `TITLE …` and `CHAPTER …` rows set the context
//!   for the section rows that follow them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::{CollectionInfo, Metadata, OrdinanceRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::store::DocumentStore;
use crate::vectorstore::VectorStore;

/// Title of the banner row that heads every export.
const BANNER_ROW: &str = "Code of Ordinances";

#[derive(Debug, Deserialize)]
struct RecordEntry {
    metadata: Metadata,
    #[serde(default)]
    content: String,
}

/// One row of a spreadsheet export.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SpreadsheetRow {
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
    #[serde(rename = "Subtitle", default)]
    pub subtitle: Option<String>,
    #[serde(rename = "Url", default)]
    pub url: Option<String>,
    #[serde(rename = "Content", default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExportFile {
    Records(Vec<RecordEntry>),
    Rows(Vec<SpreadsheetRow>),
}

fn cell(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or_default()
}

fn join_heading(heading: &str, subtitle: &str) -> String {
    [heading, subtitle].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(", ")
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    Some(value.into()).filter(|v| !v.is_empty())
}

/// Turn spreadsheet rows into ordinance records.
///
/// Section rows without content are skipped.
///
/// State and city are the first two path segments of the section URL
/// (`https://host/{state}/{city}/...`).
pub fn records_from_rows(rows: &[SpreadsheetRow]) -> Vec<OrdinanceRecord> {
    let mut title: Option<String> = None;
    let mut chapter: Option<String> = None;
    let mut records = Vec::new();

    for row in rows {
        let heading = cell(&row.title);
        let subtitle = cell(&row.subtitle);

        if heading == BANNER_ROW {
            continue;
        }
        if heading.starts_with("TITLE ") {
            title = non_empty(join_heading(heading, subtitle));
            continue;
        }
        if heading.starts_with("CHAPTER") {
            chapter = non_empty(join_heading(heading, subtitle));
            continue;
        }

        let content = cell(&row.content);
        if content.is_empty() {
            warn!(section = heading, "skipping section row without content");
            continue;
        }

        let url = cell(&row.url);
        let mut segments = url.split('/').skip(3);
        records.push(OrdinanceRecord {
            title: title.clone(),
            chapter: chapter.clone(),
            section: non_empty(heading),
            subtitle: non_empty(subtitle),
            state: segments.next().and_then(non_empty),
            city: segments.next().and_then(non_empty),
            url: non_empty(url),
            content: content.to_string(),
        });
    }
    records
}

/// Read one export file into records. Entries without content are
/// skipped.
///
/// # Errors
///
/// Returns [`RagError::Ingestion`] if the file cannot be read or is in
/// neither export shape.
pub async fn load_export(path: &Path) -> Result<Vec<OrdinanceRecord>> {
    let fail = |message: String| RagError::Ingestion {
        message: format!("{}: {message}", path.display()),
        batches_completed: 0,
        batches_total: 0,
    };

    let raw = tokio::fs::read_to_string(path).await.map_err(|e| fail(e.to_string()))?;
    let export: ExportFile = serde_json::from_str(&raw)
        .map_err(|_| fail("not a record or spreadsheet-row export".to_string()))?;

    Ok(match export {
        ExportFile::Records(entries) => entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, e)| {
                let content = e.content.trim();
                if content.is_empty() {
                    warn!(file = %path.display(), index, "skipping record without content");
                    return None;
                }
                Some(OrdinanceRecord::from_metadata(&e.metadata, content))
            })
            .collect(),
        ExportFile::Rows(rows) => records_from_rows(&rows),
    })
}

/// All `.json` files under `dir`, recursively, in sorted path order.
pub async fn export_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let fail = |message: String| RagError::Ingestion {
        message: format!("{}: {message}", dir.display()),
        batches_completed: 0,
        batches_total: 0,
    };

    let mut pending = vec![dir.to_path_buf()];
    let mut files = Vec::new();
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await.map_err(|e| fail(e.to_string()))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| fail(e.to_string()))? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| fail(e.to_string()))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// What happened to one export file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileOutcome {
    pub path: PathBuf,
    /// Records written from this file.
    pub inserted: usize,
    /// Why the file was skipped, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`ingest_directory`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestReport {
    pub info: CollectionInfo,
    pub files: Vec<FileOutcome>,
}

/// Build `collection` from every export under `dir`.
///
/// The first file recreates the collection from scratch; later files are
/// merged with duplicate skipping. A failing later file is logged and
/// skipped; a failing first file aborts.
///
/// # Errors
///
/// Returns [`RagError::Ingestion`] if `dir` holds no exports or the first
/// one cannot be loaded, and any store error from initialization.
pub async fn ingest_directory(
    backend: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    dir: &Path,
    collection: &str,
    batch_size: usize,
) -> Result<(DocumentStore, IngestReport)> {
    let files = export_files(dir).await?;
    let Some((first, rest)) = files.split_first() else {
        return Err(RagError::Ingestion {
            message: format!("no .json exports found under {}", dir.display()),
            batches_completed: 0,
            batches_total: 0,
        });
    };

    let records = load_export(first).await?;
    let store = DocumentStore::initialize(backend, embedder, collection, true)
        .await?
        .with_batch_size(batch_size);
    let inserted = store.upsert(&records, batch_size).await?.len();
    info!(file = %first.display(), inserted, "loaded initial export");

    let mut outcomes = vec![FileOutcome { path: first.clone(), inserted, error: None }];

    for path in rest {
        let outcome = match load_export(path).await {
            Ok(records) => store.update(&records, true).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(inserted) => {
                info!(file = %path.display(), inserted, "merged export");
                outcomes.push(FileOutcome { path: path.clone(), inserted, error: None });
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping export");
                outcomes.push(FileOutcome {
                    path: path.clone(),
                    inserted: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let info = store.info().await?;
    info!(
        collection = %info.name,
        documents = info.document_count,
        states = info.states.len(),
        cities = info.cities.len(),
        "ingestion finished"
    );
    Ok((store, IngestReport { info, files: outcomes }))
}
