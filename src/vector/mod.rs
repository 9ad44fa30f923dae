//! Vector similarity search over project embeddings.
//!
//! The index is an exact nearest-neighbor search over a flat collection of
//! vectors. Each build produces a new immutable [`Generation`] that is
//! published atomically; searches always run against exactly one generation.
//!
//! # Architecture
//! - [`EmbeddingGenerator`] turns normalized text into vectors
//! - [`Generation`] holds vectors plus the position to project id mapping
//! - [`VectorIndex`] owns the current generation and its on-disk snapshot

mod embedding;
mod generation;
mod index;
mod snapshot;
mod types;

pub use embedding::{
    EmbeddingGenerator, FastEmbedGenerator, HashingEmbeddingGenerator, create_embedding_generator,
    normalize_text, parse_embedding_model, project_text,
};
pub use generation::{Generation, Neighbor, squared_l2};
pub use index::{DEFAULT_BATCH_SIZE, LoadOutcome, VectorIndex};
pub use snapshot::{LoadedSnapshot, SnapshotMetadata, SnapshotStore};
pub use types::{VECTOR_DIMENSION_384, VectorDimension, VectorError};
