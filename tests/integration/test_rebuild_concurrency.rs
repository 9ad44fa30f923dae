//! Test: background rebuilds under concurrent requests and queries
//!
//! Rebuild requests from many threads must collapse into at most one running
//! and one pending rebuild, and queries running during a rebuild must always
//! see a complete generation.

use crate::common::TestWorkspace;
use projmatch::RebuildTrigger;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn populate(ws: &TestWorkspace, count: usize) {
    for i in 0..count {
        ws.add(
            &format!("Project {i}"),
            &format!("Summary number {i} about topic {}", i % 7),
            "General",
        );
    }
}

#[test]
fn test_concurrent_requests_coalesce() {
    let ws = TestWorkspace::new();
    populate(&ws, 200);

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let service = Arc::clone(&ws.service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.notify_projects_changed()
            })
        })
        .collect();

    let triggers: Vec<RebuildTrigger> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ws.service.wait_for_rebuild(Duration::from_secs(30)));

    let started = triggers
        .iter()
        .filter(|t| **t == RebuildTrigger::Started)
        .count();
    let coalesced = triggers
        .iter()
        .filter(|t| **t == RebuildTrigger::Coalesced)
        .count();

    // A request can only start a rebuild once the previous one has drained.
    assert!(started >= 1);
    assert!(coalesced <= started);

    let stats = ws.service.rebuild_stats();
    assert_eq!(stats.started as usize, started + coalesced);
    assert_eq!(stats.completed, stats.started);
    assert_eq!(stats.failed, 0);
    assert_eq!(ws.service.status().entries, Some(200));
}

#[test]
fn test_queries_during_rebuild_see_whole_generations() {
    let ws = TestWorkspace::new();
    populate(&ws, 100);
    ws.rebuild();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&ws.service);
            thread::spawn(move || {
                for _ in 0..50 {
                    let generation = service.index().current().expect("generation published");
                    // Every published generation pairs each id with one vector.
                    assert_eq!(generation.ids().len(), generation.len());
                    assert!((100..=150).contains(&generation.len()));
                    for position in 0..generation.len() {
                        assert!(generation.vector(position).is_some());
                    }

                    let matches = service.query("Project 3", "Summary number 3").unwrap();
                    assert!(!matches.is_empty());
                    assert!(matches.len() <= 2);
                }
            })
        })
        .collect();

    for i in 100..150 {
        ws.add(&format!("Project {i}"), "Late addition", "General");
        ws.service.notify_projects_changed();
    }

    for reader in readers {
        reader.join().unwrap();
    }

    ws.rebuild();
    assert_eq!(ws.service.status().entries, Some(150));
}

#[test]
fn test_rebuild_persists_snapshot() {
    let ws = TestWorkspace::new();
    populate(&ws, 10);
    ws.rebuild();

    let metadata = ws
        .service
        .index()
        .snapshot()
        .read_metadata()
        .expect("snapshot written after rebuild");
    assert_eq!(metadata.entry_count, 10);
    assert_eq!(metadata.model_name, "hashing-64");
}

#[test]
fn test_status_while_idle() {
    let ws = TestWorkspace::new();
    populate(&ws, 3);
    ws.rebuild();

    let status = ws.service.status();
    assert!(!status.rebuilding);
    assert_eq!(status.dimension, 64);
    assert_eq!(status.rebuilds.completed, 1);
    assert!(status.built_at.is_some());
}
