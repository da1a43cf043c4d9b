//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the risk engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker pool, timeouts and backend routing.
    pub execution: ExecutionConfig,

    /// Result cache settings.
    pub cache: CacheConfig,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Health thresholds checked against metrics snapshots.
    pub thresholds: ThresholdConfig,
}

impl EngineConfig {
    /// Per-request timeout applied around every backend call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.execution.request_timeout_ms)
    }

    /// Timeout applied to a whole batch. Saturates instead of overflowing.
    pub fn batch_timeout(&self) -> Duration {
        self.request_timeout()
            .checked_mul(self.execution.batch_timeout_multiplier)
            .unwrap_or(Duration::MAX)
    }

    /// How long a batch item may wait for queue capacity.
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.execution.submit_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn cache_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache.cleanup_interval_secs)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker.recovery_timeout_secs)
    }
}

/// Execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Number of long-lived workers (also the batch size limit).
    pub max_concurrent_requests: usize,

    /// Capacity of the bounded job queue.
    pub queue_capacity: usize,

    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Batch timeout as a multiple of the request timeout.
    pub batch_timeout_multiplier: u32,

    /// Per-item wait for queue capacity inside a batch, in milliseconds.
    pub submit_timeout_ms: u64,

    /// Model selector passed through to the prediction backend.
    pub model_selector: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 100,
            queue_capacity: 200,
            request_timeout_ms: 500,
            batch_timeout_multiplier: 2,
            submit_timeout_ms: 100,
            model_selector: "auto".to_string(),
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable result caching. When disabled a no-op cache is used.
    pub enabled: bool,

    /// Time-to-live for cached results in seconds.
    pub ttl_secs: u64,

    /// Maximum number of cached entries.
    pub max_size: usize,

    /// Interval between background sweeps of expired entries in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_size: 10_000,
            cleanup_interval_secs: 60,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds after the last failure before a trial call is admitted.
    pub recovery_timeout_secs: u64,

    /// Maximum trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            half_open_max_calls: 3,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the in-process metrics collector.
    pub metrics_enabled: bool,

    /// Prometheus exporter bind address. Empty disables the exporter.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: String::new(),
        }
    }
}

/// Performance thresholds used for health reporting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Maximum acceptable average request latency in milliseconds.
    pub max_avg_latency_ms: u64,

    /// Minimum acceptable success rate (0.0 - 1.0).
    pub min_success_rate: f64,

    /// Minimum acceptable cache hit rate (0.0 - 1.0).
    pub min_cache_hit_rate: f64,

    /// Maximum acceptable error rate (0.0 - 1.0).
    pub max_error_rate: f64,

    /// Minimum acceptable throughput in requests per second.
    pub min_throughput_rps: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            max_avg_latency_ms: 500,
            min_success_rate: 0.95,
            min_cache_hit_rate: 0.0,
            max_error_rate: 0.05,
            min_throughput_rps: 0.0,
        }
    }
}
