//! In-process cache backend.

use super::{CacheBackend, CacheError};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Number of writes between full sweeps of expired entries.
const PURGE_INTERVAL: usize = 256;

/// Thread-safe in-memory store with per-key expiry.
///
/// Expired entries are dropped when they are read, and every
/// [`PURGE_INTERVAL`] writes a sweep removes expired keys that were never
/// read again. Memory is bounded by the keys written within one TTL.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<String, (String, Instant)>,
    writes: AtomicUsize,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all expired entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn probe(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.1 > now => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(None)
    }

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_INTERVAL == PURGE_INTERVAL - 1 {
            self.purge_expired();
        }
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
