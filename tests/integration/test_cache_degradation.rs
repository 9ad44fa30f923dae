//! Test: queries keep working when the result cache is unreachable

use crate::common::{TestWorkspace, sample_projects::*};
use projmatch::ResultCache;
use projmatch::cache::RedisCacheBackend;
use projmatch::config::{CacheBackendKind, CacheConfig};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

/// An address nothing listens on.
fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

#[test]
fn test_query_succeeds_with_unreachable_redis() {
    let backend = RedisCacheBackend::new(dead_address(), Duration::from_millis(100));
    let ws = TestWorkspace::with_cache(ResultCache::new(
        Arc::new(backend),
        Duration::from_secs(60),
        "similarity",
    ));
    for (title, summary, domain) in [CHAT_BOT, IMAGE_CLASSIFIER] {
        ws.add(title, summary, domain);
    }
    ws.rebuild();

    for _ in 0..3 {
        let matches = ws.service.query("Chat Bot", "NLP assistant").unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].project.title, "Chat Bot");
    }
}

#[test]
fn test_redis_config_without_server_is_bypassed() {
    let config = CacheConfig {
        backend: CacheBackendKind::Redis,
        address: dead_address(),
        connect_timeout_ms: 100,
        ..CacheConfig::default()
    };
    let ws = TestWorkspace::with_cache(ResultCache::from_config(&config));
    ws.add(WEATHER_APP.0, WEATHER_APP.1, WEATHER_APP.2);
    ws.rebuild();

    let matches = ws.service.query("Weather", "Forecasts").unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].project.title, "Weather App");
}

#[test]
fn test_disabled_cache_reports_disabled() {
    let config = CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    };
    let ws = TestWorkspace::with_cache(ResultCache::from_config(&config));
    assert!(!ws.service.status().cache_enabled);

    ws.add(CHAT_BOT.0, CHAT_BOT.1, CHAT_BOT.2);
    ws.rebuild();
    assert_eq!(ws.service.query("Chat Bot", "NLP assistant").unwrap().len(), 1);
}
