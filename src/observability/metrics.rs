//! Metrics exposition.
//!
//! # Responsibilities
//! - Forward engine events to the `metrics` facade
//! - Expose a Prometheus-compatible scrape endpoint when configured
//!
//! # Metrics
//! - `risk_engine_requests_total` (counter): backend-bound requests by outcome
//! - `risk_engine_request_duration_seconds` (histogram): successful request latency
//! - `risk_engine_errors_total` (counter): errors by kind
//! - `risk_engine_cache_lookups_total` (counter): lookups by result
//! - `risk_engine_cache_entries` (gauge): cached entries
//! - `risk_engine_batch_items_total` (counter): items submitted in batches
//! - `risk_engine_batch_duration_seconds` (histogram): batch latency
//! - `risk_engine_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `risk_engine_pool_rejections_total` (counter): rejected submissions by reason
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - The in-process collector (collector.rs) stays the source of truth for
//!   snapshots and health checks; this module only exports

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::engine::types::ErrorKind;
use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    ::metrics::describe_counter!(
        "risk_engine_requests_total",
        "Backend-bound requests by outcome"
    );
    ::metrics::describe_histogram!(
        "risk_engine_request_duration_seconds",
        ::metrics::Unit::Seconds,
        "Latency of successful requests"
    );
    ::metrics::describe_gauge!(
        "risk_engine_circuit_state",
        "Circuit breaker state (0=closed, 1=half-open, 2=open)"
    );

    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_request(duration: Duration) {
    ::metrics::counter!("risk_engine_requests_total", "outcome" => "success").increment(1);
    ::metrics::histogram!("risk_engine_request_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_error(kind: &str) {
    ::metrics::counter!("risk_engine_requests_total", "outcome" => "error").increment(1);
    ::metrics::counter!("risk_engine_errors_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    ::metrics::counter!("risk_engine_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_size(size: usize) {
    ::metrics::gauge!("risk_engine_cache_entries").set(size as f64);
}

pub fn record_batch(duration: Duration, items: usize) {
    ::metrics::counter!("risk_engine_batch_items_total").increment(items as u64);
    ::metrics::histogram!("risk_engine_batch_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_circuit_state(state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    ::metrics::gauge!("risk_engine_circuit_state").set(value);
}

pub fn record_pool_rejection(reason: ErrorKind) {
    ::metrics::counter!("risk_engine_pool_rejections_total", "reason" => reason.as_str()).increment(1);
}
