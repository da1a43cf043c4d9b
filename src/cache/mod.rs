//! Result caching subsystem.
//!
//! # Data Flow
//! ```text
//! RiskRequest
//!     → fingerprint.rs (normalize identifying fields → key)
//!     → ResultCache::get
//!         hit  → return cached result (no timeout, no breaker)
//!         miss → backend call → ResultCache::set on success
//!
//! ttl.rs background sweeper:
//!     fixed interval → drop expired entries
//! ```
//!
//! # Design Decisions
//! - Cache is a capability (`ResultCache`), so the engine never branches on
//!   whether caching is enabled; `NoopCache` stands in when it is not
//! - Eviction is oldest-by-expiry, not LRU
//! - The cache owns its entries; callers only see clones
//! - Cancellation-agnostic: timeouts are enforced by the engine

pub mod fingerprint;
pub mod ttl;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

pub use fingerprint::Fingerprint;
pub use ttl::TtlCache;

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
    /// hits / (hits + misses); 0 when there were no lookups.
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn new(hits: u64, misses: u64, size: usize, max_size: usize) -> Self {
        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };
        Self {
            hits,
            misses,
            size,
            max_size,
            hit_rate,
        }
    }
}

/// Key/value store for previously computed results.
pub trait ResultCache<V>: Send + Sync {
    /// Look up an unexpired value.
    fn get(&self, key: &str) -> Option<V>;

    /// Store a value, expiring after the cache's TTL.
    fn set(&self, key: &str, value: V);

    fn delete(&self, key: &str);

    fn clear(&self);

    fn stats(&self) -> CacheStats;

    /// Stop any background work. Further calls still behave correctly.
    fn close(&self) {}
}

/// Cache used when caching is disabled: every lookup misses.
#[derive(Debug, Default)]
pub struct NoopCache {
    misses: AtomicU64,
}

impl NoopCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V> ResultCache<V> for NoopCache {
    fn get(&self, _key: &str) -> Option<V> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn set(&self, _key: &str, _value: V) {}

    fn delete(&self, _key: &str) {}

    fn clear(&self) {}

    fn stats(&self) -> CacheStats {
        CacheStats::new(0, self.misses.load(Ordering::Relaxed), 0, 0)
    }
}
