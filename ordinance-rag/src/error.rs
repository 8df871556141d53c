//! Error types for the `ordinance-rag` crate.

use thiserror::Error;

/// Errors that can occur while ingesting ordinances or answering queries.
#[derive(Debug, Error)]
pub enum RagError {
    /// A source record was malformed or an ingestion batch failed to persist.
    #[error(
        "Ingestion error after {batches_completed}/{batches_total} batches: {message}"
    )]
    Ingestion {
        /// A description of the failure.
        message: String,
        /// Number of batches written before the failure.
        batches_completed: usize,
        /// Number of batches the operation was split into.
        batches_total: usize,
    },

    /// The embedding provider could not embed the given text.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Store error ({backend}): {message}")]
    Store {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The completion model was unavailable or returned a malformed response.
    #[error("Completion error ({provider}): {message}")]
    Completion {
        /// The completion provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A request was missing a required field or carried an invalid value.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a [`RagError`], used to pick user-facing messages
/// and HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Ingestion,
    Store,
    Completion,
    Validation,
    Config,
}

impl RagError {
    pub(crate) fn store(backend: &str, message: impl Into<String>) -> Self {
        Self::Store { backend: backend.to_string(), message: message.into() }
    }

    pub(crate) fn completion(provider: &str, message: impl Into<String>) -> Self {
        Self::Completion { provider: provider.to_string(), message: message.into() }
    }

    /// Classify this error.
    ///
    /// Embedding failures surface as [`ErrorKind::Completion`] since both are
    /// failures of a remote model call.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ingestion { .. } => ErrorKind::Ingestion,
            Self::Embedding { .. } | Self::Completion { .. } => ErrorKind::Completion,
            Self::Store { .. } => ErrorKind::Store,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// A generic message safe to show to end users. The full detail is
    /// available through `Display`.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Ingestion => "Failed to ingest ordinance documents",
            ErrorKind::Store => "The ordinance store is currently unavailable",
            ErrorKind::Completion => "The language model failed to produce an answer",
            ErrorKind::Validation => "The request was invalid",
            ErrorKind::Config => "The service is misconfigured",
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
