//! Time-bounded cache of ranked query results.
//!
//! Results are keyed by a [`Fingerprint`] of the normalized query text and
//! stored as JSON `[{"id": .., "similarity": ..}]` in a [`CacheBackend`].
//! The backend is probed before every operation; when the probe fails the
//! operation is skipped (a `get` becomes a miss, a `put` does nothing) and
//! the query path carries on uncached.

mod memory;
mod redis;

pub use memory::MemoryCacheBackend;
pub use redis::RedisCacheBackend;

use crate::ProjectId;
use crate::config::{CacheBackendKind, CacheConfig};
use crate::vector::normalize_text;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from a cache backend.
///
/// None of these reach the query caller; the cache degrades to a pass-through.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected reply from cache backend: {0}")]
    Protocol(String),

    #[error("Failed to (de)serialize cached result: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Deterministic key derived from the normalized title and summary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(title: &str, summary: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_text(title).as_bytes());
        hasher.update(b"\n");
        hasher.update(normalize_text(summary).as_bytes());
        let digest = hasher.finalize();

        let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One cached result entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredProject {
    pub id: ProjectId,
    pub similarity: f32,
}

/// Key-value store with per-key expiration.
pub trait CacheBackend: Send + Sync {
    /// Check that the backend is reachable right now.
    fn probe(&self) -> Result<(), CacheError>;

    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value`, replacing any existing entry, expiring after `ttl`.
    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Default result time-to-live.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Result cache with silent degradation.
#[derive(Clone)]
pub struct ResultCache {
    backend: Option<Arc<dyn CacheBackend>>,
    ttl: Duration,
    prefix: String,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("ttl", &self.ttl)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration, prefix: impl Into<String>) -> Self {
        Self {
            backend: Some(backend),
            ttl,
            prefix: prefix.into(),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttl: DEFAULT_TTL,
            prefix: String::new(),
        }
    }

    /// Build the cache described by the `[cache]` settings.
    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let backend: Arc<dyn CacheBackend> = match config.backend {
            CacheBackendKind::Memory => Arc::new(MemoryCacheBackend::new()),
            CacheBackendKind::Redis => Arc::new(RedisCacheBackend::new(
                config.address.clone(),
                Duration::from_millis(config.connect_timeout_ms),
            )),
        };
        Self::new(
            backend,
            Duration::from_secs(config.ttl_secs),
            config.key_prefix.clone(),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn key(&self, fingerprint: &Fingerprint) -> String {
        format!("{}:{fingerprint}", self.prefix)
    }

    /// Reachable backend, or `None` when disabled or the probe fails.
    fn live_backend(&self) -> Option<&Arc<dyn CacheBackend>> {
        let backend = self.backend.as_ref()?;
        match backend.probe() {
            Ok(()) => Some(backend),
            Err(e) => {
                tracing::debug!("Bypassing {} cache: {e}", backend.name());
                None
            }
        }
    }

    /// Cached result for `fingerprint`, or `None` on miss, expiry or backend failure.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Vec<ScoredProject>> {
        let backend = self.live_backend()?;
        let key = self.key(fingerprint);

        let raw = match backend.get(&key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::debug!("Cache read for {key} failed: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(results) => Some(results),
            Err(e) => {
                tracing::warn!("Ignoring malformed cache entry {key}: {e}");
                None
            }
        }
    }

    /// Store a result with the default TTL.
    pub fn put(&self, fingerprint: &Fingerprint, results: &[ScoredProject]) {
        self.put_with_ttl(fingerprint, results, self.ttl);
    }

    pub fn put_with_ttl(&self, fingerprint: &Fingerprint, results: &[ScoredProject], ttl: Duration) {
        let Some(backend) = self.live_backend() else {
            return;
        };
        let key = self.key(fingerprint);

        let json = match serde_json::to_string(results) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {key}: {e}");
                return;
            }
        };

        if let Err(e) = backend.set_ex(&key, &json, ttl) {
            tracing::debug!("Cache write for {key} failed: {e}");
        }
    }
}
