//! Test: end-to-end similarity queries against a small catalog

use crate::common::{TestWorkspace, sample_projects::*};
use projmatch::{ProjectId, similarity_score};

#[test]
fn test_exact_match_ranks_first_with_full_score() {
    let ws = TestWorkspace::new();
    for (title, summary, domain) in [CHAT_BOT, IMAGE_CLASSIFIER] {
        ws.add(title, summary, domain);
    }
    ws.rebuild();

    let matches = ws.service.query("Chat Bot", "NLP assistant").unwrap();

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].project.title, "Chat Bot");
    assert!((matches[0].score - 100.0).abs() < 1e-3);
    assert_eq!(matches[1].project.title, "Image Classifier");
    assert!(matches[1].score < matches[0].score);
}

#[test]
fn test_paraphrased_query_prefers_related_project() {
    let ws = TestWorkspace::new();
    for (title, summary, domain) in [CHAT_BOT, IMAGE_CLASSIFIER] {
        ws.add(title, summary, domain);
    }
    ws.rebuild();

    let matches = ws
        .service
        .query("Chatbot App", "An NLP based assistant")
        .unwrap();

    assert_eq!(matches[0].project.id, ProjectId::new(1).unwrap());
    assert!(matches[0].score > matches[1].score);
}

#[test]
fn test_rebuilding_unchanged_catalog_reproduces_vectors() {
    let ws = TestWorkspace::new();
    for (title, summary, domain) in [CHAT_BOT, IMAGE_CLASSIFIER, WEATHER_APP] {
        ws.add(title, summary, domain);
    }
    ws.rebuild();
    let first = ws.service.index().current().unwrap();
    ws.rebuild();
    let second = ws.service.index().current().unwrap();

    assert!(!std::sync::Arc::ptr_eq(&first, &second));
    let a: Vec<_> = first.entries().map(|(id, v)| (id, v.to_vec())).collect();
    let b: Vec<_> = second.entries().map(|(id, v)| (id, v.to_vec())).collect();
    assert_eq!(a, b);
}

#[test]
fn test_query_text_is_normalized() {
    let ws = TestWorkspace::new();
    for (title, summary, domain) in [CHAT_BOT, IMAGE_CLASSIFIER] {
        ws.add(title, summary, domain);
    }
    ws.rebuild();

    let matches = ws.service.query("  CHAT bot ", "nlp ASSISTANT").unwrap();
    assert_eq!(matches[0].project.title, "Chat Bot");
    assert!((matches[0].score - 100.0).abs() < 1e-3);
}

#[test]
fn test_duplicate_titles_are_collapsed() {
    let ws = TestWorkspace::new();
    ws.add("Chat Bot", "NLP assistant", "AI");
    ws.add("Chat Bot", "NLP assistant for support tickets", "AI");
    ws.add(IMAGE_CLASSIFIER.0, IMAGE_CLASSIFIER.1, IMAGE_CLASSIFIER.2);
    ws.rebuild();

    let matches = ws.service.query("Chat Bot", "NLP assistant").unwrap();
    let titles: Vec<_> = matches.iter().map(|m| m.project.title.as_str()).collect();
    assert_eq!(titles, vec!["Chat Bot", "Image Classifier"]);
    assert_eq!(matches[0].project.id, ProjectId::new(1).unwrap());
}

#[test]
fn test_single_project_gives_single_match() {
    let ws = TestWorkspace::new();
    ws.add(WEATHER_APP.0, WEATHER_APP.1, WEATHER_APP.2);
    ws.rebuild();

    let matches = ws.service.query("Something", "entirely different").unwrap();
    assert_eq!(matches.len(), 1);
    assert!(matches[0].score > 0.0 && matches[0].score <= 100.0);
}

#[test]
fn test_unbuilt_and_empty_index_return_no_matches() {
    let ws = TestWorkspace::new();
    assert!(ws.service.query("Chat Bot", "NLP assistant").unwrap().is_empty());

    ws.rebuild();
    assert_eq!(ws.service.status().entries, Some(0));
    assert!(ws.service.query("Chat Bot", "NLP assistant").unwrap().is_empty());
}

#[test]
fn test_removed_project_disappears_after_rebuild() {
    let ws = TestWorkspace::new();
    for (title, summary, domain) in [CHAT_BOT, IMAGE_CLASSIFIER, WEATHER_APP] {
        ws.add(title, summary, domain);
    }
    ws.rebuild();

    ws.catalog.remove(ProjectId::new(1).unwrap()).unwrap();
    ws.rebuild();

    let matches = ws.service.query("Chat Bot", "NLP assistant").unwrap();
    assert!(matches.iter().all(|m| m.project.title != "Chat Bot"));
    assert_eq!(ws.service.status().entries, Some(2));
}

#[test]
fn test_cached_results_are_served_until_expiry() {
    let ws = TestWorkspace::with_memory_cache();
    for (title, summary, domain) in [CHAT_BOT, IMAGE_CLASSIFIER] {
        ws.add(title, summary, domain);
    }
    ws.rebuild();

    let first = ws.service.query("Chat Bot", "NLP assistant").unwrap();
    // A new project does not change a cached answer until it expires.
    ws.add("Chat Bot Pro", "NLP assistant", "AI");
    ws.rebuild();
    let second = ws.service.query("chat bot", "nlp assistant").unwrap();

    assert_eq!(first, second);
    assert_eq!(second[0].score, first[0].score);
}

#[test]
fn test_score_formula_matches_distance() {
    assert_eq!(similarity_score(0.0), 100.0);
    assert_eq!(similarity_score(1.0), 50.0);
    assert!((similarity_score(3.0) - 25.0).abs() < 1e-6);
}
