//! Test: settings files drive how the service is assembled

use projmatch::config::{CacheBackendKind, EmbeddingProviderKind};
use projmatch::{ProjectCatalog, ProjectDraft, Settings, SimilarityService};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_settings(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_file_values_override_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(
        &dir,
        r#"
[embedding]
provider = "hashing"
dimension = 48

[cache]
backend = "redis"
ttl_secs = 120

[ranking]
top_n = 3
"#,
    );

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.embedding.provider, EmbeddingProviderKind::Hashing);
    assert_eq!(settings.embedding.dimension, 48);
    assert_eq!(settings.cache.backend, CacheBackendKind::Redis);
    assert_eq!(settings.cache.ttl_secs, 120);
    assert_eq!(settings.ranking.top_n, 3);
    // Untouched sections keep their defaults.
    assert_eq!(settings.ranking.candidate_pool, 8);
    assert_eq!(settings.watch.debounce_ms, 500);
}

#[test]
fn test_paths_resolve_against_workspace_root() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_string_lossy().replace('\\', "/");
    let path = write_settings(
        &dir,
        &format!(
            r#"
workspace_root = "{root}"
index_path = "data/index"
catalog_path = "data/projects.json"
"#
        ),
    );

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.resolved_index_path(), dir.path().join("data/index"));
    assert_eq!(
        settings.resolved_catalog_path(),
        dir.path().join("data/projects.json")
    );
}

#[test]
fn test_service_from_settings_uses_configured_provider() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_string_lossy().replace('\\', "/");
    let path = write_settings(
        &dir,
        &format!(
            r#"
workspace_root = "{root}"

[embedding]
provider = "hashing"
dimension = 32

[ranking]
top_n = 1
"#
        ),
    );
    let settings = Settings::load_from(&path).unwrap();

    let catalog = ProjectCatalog::open(settings.resolved_catalog_path()).unwrap();
    catalog
        .insert(ProjectDraft::new("Chat Bot", "NLP assistant", "AI"))
        .unwrap();
    catalog
        .insert(ProjectDraft::new("Image Classifier", "CNN for images", "CV"))
        .unwrap();

    let service = SimilarityService::from_settings(&settings, Arc::new(catalog.clone())).unwrap();
    assert_eq!(service.status().model_name, "hashing-32");

    service.notify_projects_changed();
    assert!(service.wait_for_rebuild(Duration::from_secs(30)));

    let matches = service.query("Chat Bot", "NLP assistant").unwrap();
    assert_eq!(matches.len(), 1);
    assert!(settings.resolved_index_path().join("vectors.bin").exists());
}
