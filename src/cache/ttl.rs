//! Capacity-bounded TTL cache.
//!
//! Every entry lives for a fixed TTL. When the cache is full, the entry with
//! the soonest expiry is evicted (oldest-by-expiry, not LRU). Expired entries
//! are dropped lazily on lookup and periodically by a background sweeper.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheStats, ResultCache};
use crate::observability::metrics;

/// Longest TTL and sweep interval honored; larger values are clamped.
const MAX_TTL: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

#[derive(Debug)]
struct Shared<V> {
    state: Mutex<CacheState<V>>,
    ttl: Duration,
    max_size: usize,
}

impl<V> Shared<V> {
    /// Remove every expired entry. Returns how many were removed.
    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - state.entries.len();
        metrics::record_cache_size(state.entries.len());
        removed
    }
}

/// A thread-safe TTL cache shared by all requests.
#[derive(Debug)]
pub struct TtlCache<V> {
    shared: Arc<Shared<V>>,
    sweeper: CancellationToken,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + 'static,
{
    /// Create a cache and start its background sweeper.
    ///
    /// The sweeper only runs when called from inside a Tokio runtime; outside
    /// one, expired entries are still dropped lazily on lookup.
    pub fn new(ttl: Duration, max_size: usize, cleanup_interval: Duration) -> Self {
        let ttl = ttl.min(MAX_TTL);
        let cleanup_interval = cleanup_interval.clamp(Duration::from_millis(1), MAX_TTL);
        let shared = Arc::new(Shared {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
            ttl,
            max_size: max_size.max(1),
        });
        let sweeper = CancellationToken::new();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(sweep_loop(
                Arc::downgrade(&shared),
                cleanup_interval,
                sweeper.clone(),
            ));
        }

        Self { shared, sweeper }
    }

    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.shared.purge_expired()
    }
}

impl<V> ResultCache<V> for TtlCache<V>
where
    V: Clone + Send + 'static,
{
    fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        let expired = match state.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let value = entry.value.clone();
                state.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(key);
            tracing::trace!(key = %key, "Dropped expired cache entry on lookup");
        }
        state.misses += 1;
        None
    }

    fn set(&self, key: &str, value: V) {
        let now = Instant::now();
        // An unrepresentable expiry leaves the entry already expired.
        let expires_at = now.checked_add(self.shared.ttl).unwrap_or(now);
        let mut state = self.shared.state.lock();

        if !state.entries.contains_key(key) && state.entries.len() >= self.shared.max_size {
            let victim = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                state.entries.remove(&victim);
                tracing::debug!(evicted = %victim, "Cache full, evicted soonest-expiring entry");
            }
        }

        state
            .entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
        metrics::record_cache_size(state.entries.len());
    }

    fn delete(&self, key: &str) {
        self.shared.state.lock().entries.remove(key);
    }

    fn clear(&self) {
        self.shared.state.lock().entries.clear();
        metrics::record_cache_size(0);
    }

    fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        CacheStats::new(state.hits, state.misses, state.entries.len(), self.shared.max_size)
    }

    fn close(&self) {
        self.sweeper.cancel();
    }
}

impl<V> Drop for TtlCache<V> {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

async fn sweep_loop<V>(shared: Weak<Shared<V>>, interval: Duration, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else { break };
                let removed = shared.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired cache entries");
                }
            }
        }
    }
    tracing::trace!("Cache sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_ms: u64, max_size: usize) -> TtlCache<String> {
        TtlCache::new(Duration::from_millis(ttl_ms), max_size, Duration::from_secs(60))
    }

    #[test]
    fn test_get_set_delete() {
        let cache = cache(10_000, 10);
        assert!(cache.get("a").is_none());

        cache.set("a", "one".to_string());
        assert_eq!(cache.get("a").as_deref(), Some("one"));
        assert_eq!(cache.get("a").as_deref(), Some("one"));

        cache.delete("a");
        assert!(cache.get("a").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.size, 0);
        assert_eq!(stats.max_size, 10);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ttl_expiry_counts_as_miss_and_removes() {
        let cache = cache(50, 10);
        cache.set("k", "v".to_string());
        assert!(cache.get("k").is_some());

        std::thread::sleep(Duration::from_millis(80));

        assert_eq!(cache.len(), 1);
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_eviction_bound_and_order() {
        let cache = cache(10_000, 3);
        cache.set("first", "1".into());
        std::thread::sleep(Duration::from_millis(2));
        cache.set("second", "2".into());
        std::thread::sleep(Duration::from_millis(2));
        cache.set("third", "3".into());
        std::thread::sleep(Duration::from_millis(2));

        // Refreshing an existing key never evicts.
        cache.set("first", "1b".into());
        assert_eq!(cache.len(), 3);

        // "second" now has the soonest expiry.
        cache.set("fourth", "4".into());
        assert_eq!(cache.len(), 3);
        assert!(cache.get("second").is_none());
        assert_eq!(cache.get("first").as_deref(), Some("1b"));
        assert!(cache.get("third").is_some());
        assert!(cache.get("fourth").is_some());

        for i in 0..20 {
            cache.set(&format!("extra-{}", i), "x".into());
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn test_clear() {
        let cache = cache(10_000, 10);
        cache.set("a", "1".into());
        cache.set("b", "2".into());
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_purge_expired() {
        let cache = cache(30, 10);
        cache.set("a", "1".into());
        cache.set("b", "2".into());
        std::thread::sleep(Duration::from_millis(50));
        cache.set("c", "3".into());

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_is_clamped() {
        let cache: TtlCache<String> =
            TtlCache::new(Duration::from_secs(i64::MAX as u64), 10, Duration::MAX);
        assert_eq!(cache.ttl(), MAX_TTL);

        cache.set("a", "1".into());
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        cache.close();
    }

    #[tokio::test]
    async fn test_background_sweep() {
        let cache: TtlCache<String> =
            TtlCache::new(Duration::from_millis(20), 10, Duration::from_millis(30));
        cache.set("a", "1".into());
        cache.set("b", "2".into());

        tokio::time::sleep(Duration::from_millis(120)).await;

        // Removed by the sweeper, not by a lookup.
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 0);
        cache.close();
    }
}
