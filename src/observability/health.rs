//! Threshold checks over metrics snapshots.
//!
//! Used for health signaling only; nothing in the request path depends on it.

use serde::Serialize;

use crate::config::ThresholdConfig;
use crate::observability::collector::MetricsSnapshot;

/// Result of comparing a snapshot against thresholds.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub violations: Vec<String>,
}

/// Compare `snapshot` against `thresholds`.
///
/// Rate checks need samples: with no requests the success and error rates are
/// not checked, and with no cache lookups the hit rate is not checked.
pub fn check_thresholds(snapshot: &MetricsSnapshot, thresholds: &ThresholdConfig) -> HealthReport {
    let mut violations = Vec::new();

    if snapshot.successful_requests > 0
        && snapshot.avg_duration_ms > thresholds.max_avg_latency_ms as f64
    {
        violations.push(format!(
            "average latency {:.1}ms exceeds {}ms",
            snapshot.avg_duration_ms, thresholds.max_avg_latency_ms
        ));
    }

    if snapshot.total_requests > 0 {
        if snapshot.success_rate < thresholds.min_success_rate {
            violations.push(format!(
                "success rate {:.3} below {:.3}",
                snapshot.success_rate, thresholds.min_success_rate
            ));
        }
        if snapshot.error_rate > thresholds.max_error_rate {
            violations.push(format!(
                "error rate {:.3} exceeds {:.3}",
                snapshot.error_rate, thresholds.max_error_rate
            ));
        }
    }

    if snapshot.cache_hits + snapshot.cache_misses > 0
        && snapshot.cache_hit_rate < thresholds.min_cache_hit_rate
    {
        violations.push(format!(
            "cache hit rate {:.3} below {:.3}",
            snapshot.cache_hit_rate, thresholds.min_cache_hit_rate
        ));
    }

    if snapshot.throughput_rps < thresholds.min_throughput_rps {
        violations.push(format!(
            "throughput {:.2} rps below {:.2} rps",
            snapshot.throughput_rps, thresholds.min_throughput_rps
        ));
    }

    HealthReport {
        healthy: violations.is_empty(),
        violations,
    }
}
