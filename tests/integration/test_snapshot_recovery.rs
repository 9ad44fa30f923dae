//! Test: snapshot reload and fallback builds across service restarts

use crate::common::{TestWorkspace, create_service, sample_projects::*};
use projmatch::ResultCache;
use projmatch::vector::{HashingEmbeddingGenerator, LoadOutcome, VectorDimension, VectorIndex};
use std::sync::Arc;

fn seeded_workspace() -> TestWorkspace {
    let ws = TestWorkspace::new();
    for (title, summary, domain) in [CHAT_BOT, IMAGE_CLASSIFIER, WEATHER_APP] {
        ws.add(title, summary, domain);
    }
    ws.rebuild();
    ws
}

#[test]
fn test_restart_loads_snapshot() {
    let ws = seeded_workspace();
    let expected = ws.service.query("Image Classifier", "CNN for images").unwrap();

    let restarted = create_service(&ws.catalog, &ws.dir, ResultCache::disabled());
    let outcome = restarted.load_or_build().unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded { count: 3 });

    let matches = restarted.query("Image Classifier", "CNN for images").unwrap();
    assert_eq!(matches, expected);
}

#[test]
fn test_corrupt_vectors_fall_back_to_build() {
    let ws = seeded_workspace();
    let vectors = ws.index_dir().join("vectors.bin");
    let mut bytes = std::fs::read(&vectors).unwrap();
    bytes.truncate(bytes.len() - 3);
    std::fs::write(&vectors, bytes).unwrap();

    let restarted = create_service(&ws.catalog, &ws.dir, ResultCache::disabled());
    let outcome = restarted.load_or_build().unwrap();
    assert!(matches!(outcome, LoadOutcome::Rebuilt { count: 3, .. }));

    // The fallback build rewrote a valid snapshot.
    let again = create_service(&ws.catalog, &ws.dir, ResultCache::disabled());
    assert_eq!(again.load_or_build().unwrap(), LoadOutcome::Loaded { count: 3 });
}

#[test]
fn test_bad_magic_is_rejected() {
    let ws = seeded_workspace();
    let vectors = ws.index_dir().join("vectors.bin");
    let mut bytes = std::fs::read(&vectors).unwrap();
    bytes[..4].copy_from_slice(b"XXXX");
    std::fs::write(&vectors, bytes).unwrap();

    let restarted = create_service(&ws.catalog, &ws.dir, ResultCache::disabled());
    match restarted.load_or_build().unwrap() {
        LoadOutcome::Rebuilt { reason, .. } => assert!(!reason.is_empty()),
        other => panic!("expected a rebuild, got {other:?}"),
    }
}

#[test]
fn test_different_model_forces_rebuild() {
    let ws = seeded_workspace();

    let wider = Arc::new(HashingEmbeddingGenerator::new(
        VectorDimension::new(128).unwrap(),
    ));
    let index = VectorIndex::new(wider, ws.index_dir());
    assert!(index.load().is_err());

    let outcome = index
        .load_or_build(|| Ok(projmatch::projects::embedding_inputs(&ws.catalog)?))
        .unwrap();
    assert!(matches!(outcome, LoadOutcome::Rebuilt { count: 3, .. }));
    assert_eq!(index.snapshot().read_metadata().unwrap().dimension, 128);
}

#[test]
fn test_missing_snapshot_builds_from_catalog() {
    let ws = TestWorkspace::new();
    ws.add(CHAT_BOT.0, CHAT_BOT.1, CHAT_BOT.2);

    assert!(!ws.service.index().snapshot().exists());
    let outcome = ws.service.load_or_build().unwrap();
    assert!(matches!(outcome, LoadOutcome::Rebuilt { count: 1, .. }));
    assert!(ws.service.index().snapshot().exists());
}
