//! Resilient execution engine for risk-scoring requests.
//!
//! Every request to a prediction backend passes through a result cache, a
//! circuit breaker and a per-request deadline. Batches fan out over a bounded
//! worker pool, and a metrics collector aggregates what happened.
//!
//! ```text
//!   caller ──▶ RiskEngine ──▶ cache ──hit──▶ result
//!                  │            │
//!                  │           miss
//!                  │            ▼
//!                  │      circuit breaker ──▶ deadline ──▶ PredictionBackend
//!                  │
//!                  └── batch ──▶ worker pool ──▶ (per item, as above)
//!
//!   metrics collector + prometheus recorder observe every step
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod execution;
pub mod observability;
pub mod resilience;

pub use config::EngineConfig;
pub use engine::{EngineError, EngineResult, PredictionBackend, RiskEngine};
