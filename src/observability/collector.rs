//! In-process metrics collector.
//!
//! Counters and duration aggregates are grouped by concern (requests, cache,
//! batches, error kinds), each behind its own lock, so recording in one group
//! never contends with another. Rates are derived at snapshot time.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::observability::metrics;

#[derive(Debug, Default)]
struct DurationStats {
    count: u64,
    sum: Duration,
    min: Option<Duration>,
    max: Duration,
}

impl DurationStats {
    fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.sum += duration;
        self.min = Some(self.min.map_or(duration, |m| m.min(duration)));
        self.max = self.max.max(duration);
    }

    fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum.as_secs_f64() * 1000.0 / self.count as f64
        }
    }
}

#[derive(Debug, Default)]
struct RequestCounters {
    total: u64,
    successful: u64,
    failed: u64,
    durations: DurationStats,
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: u64,
    misses: u64,
}

#[derive(Debug, Default)]
struct BatchCounters {
    batches: u64,
    items: u64,
    durations: DurationStats,
}

/// Copy of the collector's state with derived rates.
#[derive(Debug, Clone, Serialize, Default)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub error_rate: f64,

    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,

    pub batch_requests: u64,
    pub batch_items: u64,
    pub avg_batch_size: f64,
    pub avg_batch_duration_ms: f64,

    /// Requests per second since creation or the last reset.
    pub throughput_rps: f64,
    pub uptime_secs: f64,

    pub errors_by_type: BTreeMap<String, u64>,
}

/// Aggregates latency, error, cache and throughput statistics.
#[derive(Debug)]
pub struct MetricsCollector {
    requests: Mutex<RequestCounters>,
    cache: Mutex<CacheCounters>,
    batches: Mutex<BatchCounters>,
    errors_by_type: DashMap<String, u64>,
    started_at: Mutex<Instant>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(RequestCounters::default()),
            cache: Mutex::new(CacheCounters::default()),
            batches: Mutex::new(BatchCounters::default()),
            errors_by_type: DashMap::new(),
            started_at: Mutex::new(Instant::now()),
        }
    }

    /// Record a successful request and its latency.
    pub fn record_request(&self, duration: Duration) {
        {
            let mut r = self.requests.lock();
            r.total += 1;
            r.successful += 1;
            r.durations.record(duration);
        }
        metrics::record_request(duration);
    }

    /// Record a failed request of unspecified kind.
    pub fn record_error(&self) {
        self.record_error_with_type("unknown");
    }

    /// Record a failed request, tallied under `kind`.
    pub fn record_error_with_type(&self, kind: &str) {
        {
            let mut r = self.requests.lock();
            r.total += 1;
            r.failed += 1;
        }
        *self.errors_by_type.entry(kind.to_string()).or_insert(0) += 1;
        metrics::record_error(kind);
    }

    pub fn record_cache_hit(&self) {
        self.cache.lock().hits += 1;
        metrics::record_cache_lookup(true);
    }

    pub fn record_cache_miss(&self) {
        self.cache.lock().misses += 1;
        metrics::record_cache_lookup(false);
    }

    pub fn record_batch_request(&self, duration: Duration, item_count: usize) {
        {
            let mut b = self.batches.lock();
            b.batches += 1;
            b.items += item_count as u64;
            b.durations.record(duration);
        }
        metrics::record_batch(duration, item_count);
    }

    pub fn get_stats(&self) -> MetricsSnapshot {
        let elapsed = self.started_at.lock().elapsed();
        let mut snapshot = MetricsSnapshot {
            uptime_secs: elapsed.as_secs_f64(),
            ..MetricsSnapshot::default()
        };

        {
            let r = self.requests.lock();
            snapshot.total_requests = r.total;
            snapshot.successful_requests = r.successful;
            snapshot.failed_requests = r.failed;
            snapshot.avg_duration_ms = r.durations.avg_ms();
            snapshot.min_duration_ms = r.durations.min.unwrap_or_default().as_secs_f64() * 1000.0;
            snapshot.max_duration_ms = r.durations.max.as_secs_f64() * 1000.0;
        }
        if snapshot.total_requests > 0 {
            let total = snapshot.total_requests as f64;
            snapshot.success_rate = snapshot.successful_requests as f64 / total;
            snapshot.error_rate = snapshot.failed_requests as f64 / total;
        }
        if elapsed > Duration::ZERO {
            snapshot.throughput_rps = snapshot.total_requests as f64 / elapsed.as_secs_f64();
        }

        {
            let c = self.cache.lock();
            snapshot.cache_hits = c.hits;
            snapshot.cache_misses = c.misses;
        }
        let lookups = snapshot.cache_hits + snapshot.cache_misses;
        if lookups > 0 {
            snapshot.cache_hit_rate = snapshot.cache_hits as f64 / lookups as f64;
        }

        {
            let b = self.batches.lock();
            snapshot.batch_requests = b.batches;
            snapshot.batch_items = b.items;
            snapshot.avg_batch_duration_ms = b.durations.avg_ms();
            if b.batches > 0 {
                snapshot.avg_batch_size = b.items as f64 / b.batches as f64;
            }
        }

        snapshot.errors_by_type = self
            .errors_by_type
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        snapshot
    }

    /// Zero every counter and restart the throughput clock.
    pub fn reset(&self) {
        *self.requests.lock() = RequestCounters::default();
        *self.cache.lock() = CacheCounters::default();
        *self.batches.lock() = BatchCounters::default();
        self.errors_by_type.clear();
        *self.started_at.lock() = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_request_and_error_counts() {
        let collector = MetricsCollector::new();
        collector.record_request(Duration::from_millis(10));
        collector.record_request(Duration::from_millis(30));
        collector.record_error_with_type("circuit_open");
        collector.record_error();

        let stats = collector.get_stats();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.failed_requests, 2);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
        assert!((stats.error_rate - 0.5).abs() < 1e-9);
        assert!((stats.avg_duration_ms - 20.0).abs() < 1e-6);
        assert!((stats.min_duration_ms - 10.0).abs() < 1e-6);
        assert!((stats.max_duration_ms - 30.0).abs() < 1e-6);
        assert_eq!(stats.errors_by_type.get("circuit_open"), Some(&1));
        assert_eq!(stats.errors_by_type.get("unknown"), Some(&1));
        assert!(stats.throughput_rps > 0.0);
    }

    #[test]
    fn test_cache_hit_rate() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.get_stats().cache_hit_rate, 0.0);

        collector.record_cache_hit();
        collector.record_cache_hit();
        collector.record_cache_hit();
        collector.record_cache_miss();

        let stats = collector.get_stats();
        assert_eq!(stats.cache_hits, 3);
        assert_eq!(stats.cache_misses, 1);
        assert!((stats.cache_hit_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_batch_stats() {
        let collector = MetricsCollector::new();
        collector.record_batch_request(Duration::from_millis(100), 10);
        collector.record_batch_request(Duration::from_millis(300), 4);

        let stats = collector.get_stats();
        assert_eq!(stats.batch_requests, 2);
        assert_eq!(stats.batch_items, 14);
        assert!((stats.avg_batch_size - 7.0).abs() < 1e-9);
        assert!((stats.avg_batch_duration_ms - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new();
        collector.record_request(Duration::from_millis(5));
        collector.record_error_with_type("backend");
        collector.record_cache_miss();
        collector.reset();

        let stats = collector.get_stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.cache_misses, 0);
        assert!(stats.errors_by_type.is_empty());
        assert_eq!(stats.min_duration_ms, 0.0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[test]
    fn test_consistency_under_concurrency() {
        let collector = Arc::new(MetricsCollector::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let collector = collector.clone();
                std::thread::spawn(move || {
                    for j in 0..500 {
                        if (i + j) % 4 == 0 {
                            collector.record_error_with_type("backend");
                        } else {
                            collector.record_request(Duration::from_micros(j));
                        }
                        if j % 2 == 0 {
                            collector.record_cache_hit();
                        } else {
                            collector.record_cache_miss();
                        }
                        let stats = collector.get_stats();
                        assert_eq!(stats.successful_requests + stats.failed_requests, stats.total_requests);
                        assert!((0.0..=1.0).contains(&stats.cache_hit_rate));
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }

        let stats = collector.get_stats();
        assert_eq!(stats.total_requests, 4000);
        assert_eq!(stats.successful_requests + stats.failed_requests, 4000);
        assert_eq!(stats.cache_hits + stats.cache_misses, 4000);
    }
}
