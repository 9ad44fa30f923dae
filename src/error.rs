//! Error types for the similarity index
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::ProjectId;
use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building, persisting or loading the vector index
#[derive(Error, Debug)]
pub enum IndexError {
    /// The embedding provider failed for at least one project
    #[error("Embedding failed while building the index: {0}")]
    Embedding(#[source] VectorError),

    /// The project source could not be listed
    #[error("Failed to list projects for indexing: {0}")]
    Source(#[from] CatalogError),

    #[error("No index snapshot found at '{path}'")]
    SnapshotNotFound { path: PathBuf },

    #[error("Index snapshot at '{path}' is unusable: {reason}")]
    SnapshotCorrupt { path: PathBuf, reason: String },

    #[error("Failed to write index snapshot to '{path}': {source}")]
    SnapshotWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to start the rebuild worker: {0}")]
    Worker(#[source] std::io::Error),

    #[error(transparent)]
    Vector(#[from] VectorError),
}

impl IndexError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Source(_) => "SOURCE_ERROR",
            Self::SnapshotNotFound { .. } => "SNAPSHOT_NOT_FOUND",
            Self::SnapshotCorrupt { .. } => "SNAPSHOT_CORRUPT",
            Self::SnapshotWrite { .. } => "SNAPSHOT_WRITE_ERROR",
            Self::Worker(_) => "WORKER_ERROR",
            Self::Vector(_) => "VECTOR_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Embedding(_) => vec![
                "Check that the embedding models were downloaded (first run needs network access)",
                "Set embedding.provider = \"hashing\" to index without model downloads",
            ],
            Self::Source(_) => vec![
                "Check that the project catalog exists and is valid JSON",
                "Run 'projmatch import <file>' to create the catalog",
            ],
            Self::SnapshotNotFound { .. } => vec![
                "Run 'projmatch index' to build the index",
                "The index is also rebuilt automatically when projects change",
            ],
            Self::SnapshotCorrupt { .. } => vec![
                "Run 'projmatch index --force' to rebuild from scratch",
                "A snapshot built with a different embedding model is never reused",
            ],
            Self::SnapshotWrite { .. } => vec![
                "Check disk space and permissions in the index directory",
                "The in-memory index is still valid, only persistence failed",
            ],
            Self::Worker(_) | Self::Vector(_) => vec![],
        }
    }
}

/// Errors surfaced to the caller of a similarity query
#[derive(Error, Debug)]
pub enum QueryError {
    /// No similarity can be computed without a query vector
    #[error("Failed to embed query: {0}")]
    Embedding(#[source] VectorError),

    #[error("Query vector rejected by the index: {0}")]
    Search(#[source] VectorError),
}

impl QueryError {
    pub fn status_code(&self) -> String {
        match self {
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Search(_) => "SEARCH_ERROR",
        }
        .to_string()
    }

    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Embedding(_) => vec![
                "Check that the embedding models are available",
                "Retry the query, provider failures are not cached",
            ],
            Self::Search(_) => vec![
                "The index was built with a different embedding model",
                "Run 'projmatch index --force' to rebuild it",
            ],
        }
    }
}

/// Errors from the project catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write catalog '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}\nSuggestion: Check the JSON syntax")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to parse CSV '{path}': {source}\nSuggestion: Expect a header row with Title, Summary and Domain columns")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Project {id} not found. Use 'projmatch status' to list indexed projects")]
    NotFound { id: ProjectId },

    #[error("Invalid project: {reason}")]
    Invalid { reason: String },

    #[error("Failed to create project ID: maximum project count reached")]
    IdExhausted,
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Result type alias for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        let err = IndexError::SnapshotCorrupt {
            path: PathBuf::from("/tmp/index"),
            reason: "bad magic".to_string(),
        };
        assert_eq!(err.status_code(), "SNAPSHOT_CORRUPT");
        assert!(!err.recovery_suggestions().is_empty());

        let err = QueryError::Embedding(VectorError::EmbeddingFailed("boom".to_string()));
        assert_eq!(err.status_code(), "EMBEDDING_ERROR");
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_catalog_error_converts_into_index_error() {
        let err: IndexError = CatalogError::IdExhausted.into();
        assert_eq!(err.status_code(), "SOURCE_ERROR");
    }
}
