//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0 and bounded, rates within [0, 1])
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::EngineConfig;

const MAX_TIMEOUT_MS: u64 = 60 * 60 * 1000;
const MAX_BATCH_TIMEOUT_MULTIPLIER: u32 = 100;
const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;
const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let exec = &config.execution;
    if exec.max_concurrent_requests == 0 {
        errors.push(ValidationError::new(
            "execution.max_concurrent_requests",
            "must be greater than 0",
        ));
    }
    if exec.queue_capacity == 0 {
        errors.push(ValidationError::new(
            "execution.queue_capacity",
            "must be greater than 0",
        ));
    }
    if exec.request_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "execution.request_timeout_ms",
            "must be greater than 0",
        ));
    }
    if exec.batch_timeout_multiplier == 0 {
        errors.push(ValidationError::new(
            "execution.batch_timeout_multiplier",
            "must be greater than 0",
        ));
    }
    if exec.model_selector.trim().is_empty() {
        errors.push(ValidationError::new(
            "execution.model_selector",
            "must not be empty",
        ));
    }

    if config.cache.enabled {
        if config.cache.ttl_secs == 0 {
            errors.push(ValidationError::new("cache.ttl_secs", "must be greater than 0"));
        }
        if config.cache.max_size == 0 {
            errors.push(ValidationError::new("cache.max_size", "must be greater than 0"));
        }
        if config.cache.cleanup_interval_secs == 0 {
            errors.push(ValidationError::new(
                "cache.cleanup_interval_secs",
                "must be greater than 0",
            ));
        }
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be greater than 0",
        ));
    }
    if config.circuit_breaker.half_open_max_calls == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.half_open_max_calls",
            "must be greater than 0",
        ));
    }

    let obs = &config.observability;
    if !obs.metrics_address.is_empty() && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a valid socket address", obs.metrics_address),
        ));
    }

    let thresholds = &config.thresholds;
    for (field, value) in [
        ("thresholds.min_success_rate", thresholds.min_success_rate),
        ("thresholds.min_cache_hit_rate", thresholds.min_cache_hit_rate),
        ("thresholds.max_error_rate", thresholds.max_error_rate),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ValidationError::new(field, format!("{} is outside [0, 1]", value)));
        }
    }
    if thresholds.min_throughput_rps < 0.0 {
        errors.push(ValidationError::new(
            "thresholds.min_throughput_rps",
            "must not be negative",
        ));
    }

    for (field, value, max) in [
        ("execution.request_timeout_ms", exec.request_timeout_ms, MAX_TIMEOUT_MS),
        ("execution.submit_timeout_ms", exec.submit_timeout_ms, MAX_TIMEOUT_MS),
        (
            "execution.batch_timeout_multiplier",
            u64::from(exec.batch_timeout_multiplier),
            u64::from(MAX_BATCH_TIMEOUT_MULTIPLIER),
        ),
        ("cache.ttl_secs", config.cache.ttl_secs, MAX_CACHE_TTL_SECS),
        ("cache.cleanup_interval_secs", config.cache.cleanup_interval_secs, MAX_INTERVAL_SECS),
        (
            "circuit_breaker.recovery_timeout_secs",
            config.circuit_breaker.recovery_timeout_secs,
            MAX_INTERVAL_SECS,
        ),
    ] {
        if value > max {
            errors.push(ValidationError::new(field, format!("{} exceeds the maximum of {}", value, max)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
