//! The vector index: builds generations, serves searches and owns the snapshot.
//!
//! The current generation pointer is the only mutable state shared between
//! the query path and the rebuild path. It is replaced wholesale under a
//! short write lock; readers clone the `Arc` and search without holding any
//! lock, so a rebuild never blocks a query and a query never sees a
//! half-built generation.
//!
//! Builds, loads and persists are serialized by a separate build lock that
//! is held from listing the source through publishing. A build that started
//! from an older project set can therefore never publish after a newer one.

use crate::ProjectId;
use crate::error::{IndexError, IndexResult};
use crate::vector::{
    EmbeddingGenerator, Generation, LoadedSnapshot, Neighbor, SnapshotMetadata, SnapshotStore,
    VectorError,
};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Default number of texts per embedding call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// How `load_or_build` obtained the current generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The snapshot on disk was valid and is now current.
    Loaded { count: usize },
    /// The snapshot was missing or unusable; a full build replaced it.
    Rebuilt { count: usize, reason: String },
}

impl LoadOutcome {
    pub fn count(&self) -> usize {
        match self {
            Self::Loaded { count } | Self::Rebuilt { count, .. } => *count,
        }
    }
}

/// Exact nearest-neighbor index over project embeddings.
pub struct VectorIndex {
    current: RwLock<Option<Arc<Generation>>>,
    build_lock: Mutex<()>,
    generator: Arc<dyn EmbeddingGenerator>,
    snapshot: SnapshotStore,
    batch_size: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("model", &self.generator.model_name())
            .field("entries", &self.current().map(|g| g.len()))
            .field("snapshot", &self.snapshot.dir())
            .finish()
    }
}

impl VectorIndex {
    /// Create an index with no current generation.
    pub fn new(generator: Arc<dyn EmbeddingGenerator>, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            current: RwLock::new(None),
            build_lock: Mutex::new(()),
            generator,
            snapshot: SnapshotStore::new(snapshot_dir),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn generator(&self) -> &Arc<dyn EmbeddingGenerator> {
        &self.generator
    }

    pub fn snapshot(&self) -> &SnapshotStore {
        &self.snapshot
    }

    /// The current generation, or `None` before the first build or load.
    pub fn current(&self) -> Option<Arc<Generation>> {
        self.current.read().clone()
    }

    fn publish(&self, generation: Generation) -> Arc<Generation> {
        let generation = Arc::new(generation);
        *self.current.write() = Some(Arc::clone(&generation));
        generation
    }

    /// Embed every item and publish the result as the new current generation.
    ///
    /// If any embedding call fails nothing is published and the previous
    /// generation stays current.
    pub fn build<I>(&self, source: I) -> IndexResult<Arc<Generation>>
    where
        I: IntoIterator<Item = (ProjectId, String)>,
    {
        let _guard = self.build_lock.lock();
        self.build_locked(source)
    }

    /// List the items and build from them under a single hold of the build lock.
    ///
    /// Use this when the item list may change between calls: the listing
    /// happens after any in-flight build has published, so the last caller's
    /// view of the source is what ends up current.
    pub fn rebuild_from<F>(&self, list: F) -> IndexResult<Arc<Generation>>
    where
        F: FnOnce() -> IndexResult<Vec<(ProjectId, String)>>,
    {
        let _guard = self.build_lock.lock();
        let items = list()?;
        self.build_locked(items)
    }

    fn build_locked<I>(&self, source: I) -> IndexResult<Arc<Generation>>
    where
        I: IntoIterator<Item = (ProjectId, String)>,
    {
        let started = Instant::now();
        let items: Vec<(ProjectId, String)> = source.into_iter().collect();
        let dimension = self.generator.dimension();

        let mut ids = Vec::with_capacity(items.len());
        let mut vectors = Vec::with_capacity(items.len() * dimension.get());

        for batch in items.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|(_, text)| text.as_str()).collect();
            let embeddings = self
                .generator
                .generate_embeddings(&texts)
                .map_err(IndexError::Embedding)?;

            if embeddings.len() != batch.len() {
                return Err(IndexError::Embedding(VectorError::EmbeddingFailed(format!(
                    "Provider returned {} embeddings for {} texts",
                    embeddings.len(),
                    batch.len()
                ))));
            }

            for ((id, _), embedding) in batch.iter().zip(embeddings) {
                dimension
                    .validate_vector(&embedding)
                    .map_err(IndexError::Embedding)?;
                ids.push(*id);
                vectors.extend_from_slice(&embedding);
            }
        }

        let generation = Generation::from_parts(dimension, ids, vectors)?;
        tracing::debug!(
            "Built generation with {} entries in {:?}",
            generation.len(),
            started.elapsed()
        );
        Ok(self.publish(generation))
    }

    /// Search the current generation.
    ///
    /// Returns an empty list when no generation has been built yet.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorError> {
        match self.current() {
            Some(generation) => generation.search(query, k),
            None => Ok(Vec::new()),
        }
    }

    /// Write the current generation to the snapshot directory.
    ///
    /// Returns `Ok(None)` when there is nothing to persist.
    pub fn persist(&self) -> IndexResult<Option<SnapshotMetadata>> {
        let _guard = self.build_lock.lock();
        self.persist_locked()
    }

    fn persist_locked(&self) -> IndexResult<Option<SnapshotMetadata>> {
        let Some(generation) = self.current() else {
            return Ok(None);
        };
        let metadata = self
            .snapshot
            .save(&generation, &self.generator.model_name())?;
        Ok(Some(metadata))
    }

    /// Load the snapshot and publish it.
    ///
    /// A snapshot produced by a different model or with a different
    /// dimension is rejected as corrupt.
    pub fn load(&self) -> IndexResult<Arc<Generation>> {
        let _guard = self.build_lock.lock();
        self.load_locked()
    }

    fn load_locked(&self) -> IndexResult<Arc<Generation>> {
        let LoadedSnapshot {
            generation,
            metadata,
        } = self.snapshot.load()?;

        let model_name = self.generator.model_name();
        if metadata.model_name != model_name {
            return Err(IndexError::SnapshotCorrupt {
                path: self.snapshot.dir().to_path_buf(),
                reason: format!(
                    "built with model '{}', current model is '{model_name}'",
                    metadata.model_name
                ),
            });
        }

        let dimension = self.generator.dimension();
        if generation.dimension() != dimension {
            return Err(IndexError::SnapshotCorrupt {
                path: self.snapshot.dir().to_path_buf(),
                reason: format!(
                    "snapshot dimension {} does not match provider dimension {dimension}",
                    generation.dimension()
                ),
            });
        }

        Ok(self.publish(generation))
    }

    /// Load the snapshot, falling back to a full build when it is missing or unusable.
    ///
    /// `source` is only called for the fallback build. A rebuilt generation is
    /// persisted; a persistence failure is logged and does not fail the call.
    pub fn load_or_build<F>(&self, source: F) -> IndexResult<LoadOutcome>
    where
        F: FnOnce() -> IndexResult<Vec<(ProjectId, String)>>,
    {
        let _guard = self.build_lock.lock();
        match self.load_locked() {
            Ok(generation) => {
                tracing::info!(
                    "Loaded index snapshot with {} entries from {}",
                    generation.len(),
                    self.snapshot.dir().display()
                );
                Ok(LoadOutcome::Loaded {
                    count: generation.len(),
                })
            }
            Err(load_err) => {
                match &load_err {
                    IndexError::SnapshotNotFound { .. } => {
                        tracing::info!("{load_err}, building index");
                    }
                    _ => tracing::warn!("{load_err}, falling back to a full build"),
                }

                let generation = self.build_locked(source()?)?;
                if let Err(e) = self.persist_locked() {
                    tracing::warn!("Failed to persist rebuilt index: {e}");
                }
                Ok(LoadOutcome::Rebuilt {
                    count: generation.len(),
                    reason: load_err.to_string(),
                })
            }
        }
    }
}
