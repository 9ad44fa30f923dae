//! Semantic project similarity search.
//!
//! Projects are embedded into vectors, kept in an exact nearest-neighbor
//! index that is rebuilt in the background when the project set changes,
//! and queried through [`SimilarityService`] with a time-bounded result cache
//! in front.

pub mod cache;
pub mod config;
pub mod display;
pub mod error;
pub mod projects;
pub mod ranking;
pub mod rebuild;
pub mod service;
pub mod types;
pub mod vector;
pub mod watcher;

// Explicit exports for better API clarity
pub use cache::{Fingerprint, ResultCache, ScoredProject};
pub use config::Settings;
pub use error::{
    CatalogError, CatalogResult, IndexError, IndexResult, QueryError, QueryResult,
};
pub use projects::{ProjectCatalog, ProjectSource};
pub use ranking::{RankedMatch, SimilarityRanker, similarity_score};
pub use rebuild::{RebuildCoordinator, RebuildStats, RebuildTrigger};
pub use service::{ServiceOptions, ServiceStatus, SimilarityService};
pub use types::{Project, ProjectDraft, ProjectId};
pub use vector::{EmbeddingGenerator, Generation, VectorIndex};
pub use watcher::CatalogWatcher;
