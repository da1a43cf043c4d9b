//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Engine, cache, breaker and pool produce:
//!     → logging.rs (structured tracing events)
//!     → collector.rs (in-process counters, durations, rates)
//!     → metrics.rs (metrics facade → optional Prometheus endpoint)
//!
//! Consumers:
//!     → RiskEngine::get_metrics (snapshot copies)
//!     → health.rs (snapshot vs configured thresholds)
//!     → Prometheus scrape
//! ```
//!
//! # Design Decisions
//! - Recording never fails the caller's request
//! - One lock per counter group; snapshots are copies
//! - Rates are derived at snapshot time, not maintained incrementally

pub mod collector;
pub mod health;
pub mod logging;
pub mod metrics;

pub use collector::{MetricsCollector, MetricsSnapshot};
pub use health::{check_thresholds, HealthReport};
