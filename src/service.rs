//! The similarity service: one object owning the index, the cache and the
//! rebuild worker.
//!
//! Construct it once at startup and share it by reference (or `Arc`).
//! Queries and rebuilds run concurrently; a query always reads a single
//! published generation.

use crate::cache::{Fingerprint, ResultCache};
use crate::config::Settings;
use crate::error::{IndexError, IndexResult, QueryError, QueryResult};
use crate::projects::{ProjectSource, embedding_inputs};
use crate::ranking::{RankedMatch, SimilarityRanker, hydrate};
use crate::rebuild::{RebuildCoordinator, RebuildStats, RebuildTrigger};
use crate::vector::{LoadOutcome, VectorIndex, create_embedding_generator, project_text};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for [`SimilarityService`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    /// Maximum matches per query
    pub top_n: usize,
    /// Neighbors fetched before title deduplication
    pub candidate_pool: usize,
    /// Persist the snapshot after each background rebuild
    pub persist: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            top_n: crate::ranking::DEFAULT_TOP_N,
            candidate_pool: 8,
            persist: true,
        }
    }
}

impl ServiceOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            top_n: settings.ranking.top_n,
            candidate_pool: settings.ranking.candidate_pool,
            persist: settings.rebuild.persist,
        }
    }
}

/// Point-in-time view of the service for `status` output.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub model_name: String,
    pub dimension: usize,
    /// `None` until a generation has been built or loaded
    pub entries: Option<usize>,
    pub built_at: Option<DateTime<Utc>>,
    pub rebuilding: bool,
    pub rebuilds: RebuildStats,
    pub cache_enabled: bool,
}

pub struct SimilarityService {
    index: Arc<VectorIndex>,
    source: Arc<dyn ProjectSource>,
    cache: ResultCache,
    ranker: SimilarityRanker,
    candidate_pool: usize,
    coordinator: RebuildCoordinator,
}

impl std::fmt::Debug for SimilarityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityService")
            .field("index", &self.index)
            .field("cache", &self.cache)
            .field("ranker", &self.ranker)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

impl SimilarityService {
    /// Wire the service and start its rebuild worker.
    pub fn new(
        index: Arc<VectorIndex>,
        source: Arc<dyn ProjectSource>,
        cache: ResultCache,
        options: ServiceOptions,
    ) -> IndexResult<Self> {
        let job_index = Arc::clone(&index);
        let job_source = Arc::clone(&source);
        let persist = options.persist;

        let coordinator = RebuildCoordinator::new(Box::new(move || -> IndexResult<usize> {
            let generation =
                job_index.rebuild_from(|| Ok(embedding_inputs(job_source.as_ref())?))?;
            if persist {
                if let Err(e) = job_index.persist() {
                    tracing::warn!("Rebuilt index could not be persisted: {e}");
                }
            }
            Ok(generation.len())
        }))
        .map_err(IndexError::Worker)?;

        Ok(Self {
            index,
            source,
            cache,
            ranker: SimilarityRanker::new(options.top_n),
            candidate_pool: options.candidate_pool.max(options.top_n),
            coordinator,
        })
    }

    /// Build the service described by `settings` over `source`.
    ///
    /// Does not load or build the index; call [`Self::load_or_build`].
    pub fn from_settings(settings: &Settings, source: Arc<dyn ProjectSource>) -> IndexResult<Self> {
        let generator = create_embedding_generator(&settings.embedding)?;
        let index = VectorIndex::new(generator, settings.resolved_index_path())
            .with_batch_size(settings.embedding.batch_size);

        Self::new(
            Arc::new(index),
            source,
            ResultCache::from_config(&settings.cache),
            ServiceOptions::from_settings(settings),
        )
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Load the snapshot or, if that fails, build from the project source.
    pub fn load_or_build(&self) -> IndexResult<LoadOutcome> {
        let source = Arc::clone(&self.source);
        self.index
            .load_or_build(move || Ok(embedding_inputs(source.as_ref())?))
    }

    /// Top matches for a candidate project.
    ///
    /// Only an embedding failure is reported; an unbuilt or empty index gives
    /// an empty list and an unreachable cache is bypassed.
    pub fn query(&self, title: &str, summary: &str) -> QueryResult<Vec<RankedMatch>> {
        let fingerprint = Fingerprint::new(title, summary);
        if let Some(cached) = self.cache.get(&fingerprint) {
            tracing::debug!("Cache hit for {fingerprint}");
            return Ok(hydrate(&cached, self.source.as_ref()));
        }

        let query_vector = self
            .index
            .generator()
            .embed(&project_text(title, summary))
            .map_err(QueryError::Embedding)?;

        let Some(generation) = self.index.current() else {
            tracing::debug!("No index generation yet, returning no matches");
            return Ok(Vec::new());
        };
        if generation.is_empty() {
            return Ok(Vec::new());
        }

        let neighbors = generation
            .search(&query_vector, self.candidate_pool)
            .map_err(QueryError::Search)?;
        let ranked = self
            .ranker
            .rank(&generation, &neighbors, self.source.as_ref());

        let scored: Vec<_> = ranked.iter().map(RankedMatch::to_scored).collect();
        self.cache.put(&fingerprint, &scored);

        Ok(ranked)
    }

    /// Schedule a background rebuild after projects were added, changed or removed.
    pub fn notify_projects_changed(&self) -> RebuildTrigger {
        self.coordinator.request()
    }

    /// Block until no rebuild is running. Returns `false` on timeout.
    pub fn wait_for_rebuild(&self, timeout: Duration) -> bool {
        self.coordinator.wait_idle(timeout)
    }

    pub fn rebuild_stats(&self) -> RebuildStats {
        self.coordinator.stats()
    }

    pub fn status(&self) -> ServiceStatus {
        let generation = self.index.current();
        let generator = self.index.generator();
        ServiceStatus {
            model_name: generator.model_name(),
            dimension: generator.dimension().get(),
            entries: generation.as_ref().map(|g| g.len()),
            built_at: generation.as_ref().map(|g| g.built_at()),
            rebuilding: self.coordinator.is_rebuilding(),
            rebuilds: self.coordinator.stats(),
            cache_enabled: self.cache.is_enabled(),
        }
    }
}
