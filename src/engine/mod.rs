//! Risk engine subsystem.
//!
//! # Data Flow
//! ```text
//! assess_risk / predict_risk:
//!     → cache fingerprint lookup ── hit ──▶ return (no timeout, no breaker)
//!     → miss: per-request deadline (resilience::timeouts)
//!     → circuit breaker (resilience::circuit_breaker)
//!     → PredictionBackend
//!     → metrics + cache store on success
//!
//! assess_risk_batch:
//!     → size check against worker count
//!     → batch deadline (request timeout × multiplier)
//!     → one job per request on the worker pool, each running assess_risk
//!     → results joined by input index
//! ```
//!
//! # Design Decisions
//! - No global lock: cache, breaker and metrics each guard their own state
//! - Fail fast: no retries; breaker-open and backend errors surface unchanged
//! - Batch failures are isolated per item and reported with their index

pub mod backend;
pub mod orchestrator;
pub mod types;

pub use backend::PredictionBackend;
pub use orchestrator::RiskEngine;
pub use types::{
    BackendError, BatchError, BatchOutcome, EngineError, EngineResult, ErrorKind, RiskAssessment,
    RiskFactor, RiskLevel, RiskPrediction, RiskRequest, RiskTrend,
};
