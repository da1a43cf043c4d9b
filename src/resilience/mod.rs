//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Backend call from the engine:
//!     → timeouts.rs (per-request deadline + caller cancellation)
//!     → circuit_breaker.rs (fail fast when open, track outcomes)
//!     → prediction backend
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - No retries at this layer; recovery is the breaker's half-open probing
//! - The breaker never looks at deadlines; the engine owns them

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitError, CircuitState};
pub use timeouts::with_deadline;
