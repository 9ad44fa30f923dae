use projmatch::cache::{MemoryCacheBackend, ResultCache};
use projmatch::vector::{HashingEmbeddingGenerator, VectorDimension, VectorIndex};
use projmatch::{ProjectCatalog, ProjectDraft, ServiceOptions, SimilarityService};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A catalog, index directory and service isolated in a temp dir.
pub struct TestWorkspace {
    pub dir: TempDir,
    pub catalog: ProjectCatalog,
    pub service: Arc<SimilarityService>,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self::with_cache(ResultCache::disabled())
    }

    pub fn with_memory_cache() -> Self {
        Self::with_cache(ResultCache::new(
            Arc::new(MemoryCacheBackend::new()),
            Duration::from_secs(60),
            "test",
        ))
    }

    pub fn with_cache(cache: ResultCache) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let catalog = ProjectCatalog::open(dir.path().join("projects.json"))
            .expect("Failed to open catalog");
        let service = create_service(&catalog, &dir, cache);
        Self {
            dir,
            catalog,
            service,
        }
    }

    pub fn index_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("index")
    }

    pub fn add(&self, title: &str, summary: &str, domain: &str) {
        self.catalog
            .insert(ProjectDraft::new(title, summary, domain))
            .expect("Failed to insert project");
    }

    /// Schedule a rebuild and wait for it to finish.
    pub fn rebuild(&self) {
        self.service.notify_projects_changed();
        assert!(
            self.service.wait_for_rebuild(Duration::from_secs(30)),
            "rebuild did not finish in time"
        );
    }
}

pub fn hashing_generator() -> Arc<HashingEmbeddingGenerator> {
    Arc::new(HashingEmbeddingGenerator::new(
        VectorDimension::new(64).expect("valid dimension"),
    ))
}

/// Service over `catalog` with an index in `dir/index`, using the offline generator.
pub fn create_service(
    catalog: &ProjectCatalog,
    dir: &TempDir,
    cache: ResultCache,
) -> Arc<SimilarityService> {
    let index = Arc::new(VectorIndex::new(hashing_generator(), dir.path().join("index")));
    Arc::new(
        SimilarityService::new(
            index,
            Arc::new(catalog.clone()),
            cache,
            ServiceOptions::default(),
        )
        .expect("Failed to start service"),
    )
}

pub mod sample_projects {
    pub const CHAT_BOT: (&str, &str, &str) = ("Chat Bot", "NLP assistant", "AI");
    pub const IMAGE_CLASSIFIER: (&str, &str, &str) = ("Image Classifier", "CNN for images", "CV");
    pub const WEATHER_APP: (&str, &str, &str) =
        ("Weather App", "Forecasts from public weather APIs", "Web");
}
