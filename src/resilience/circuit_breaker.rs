//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: next call after recovery_timeout since the last failure
//! Half-Open → Closed: first successful trial call
//! Half-Open → Open: any failed trial call
//! ```
//!
//! # Design Decisions
//! - Fail fast in Open state (the wrapped call is never invoked)
//! - At most `half_open_max_calls` trials are admitted while Half-Open; once
//!   the budget is used, further calls are rejected until a trial reports back
//! - A call dropped before completing (e.g. by a timeout) counts as a failure
//! - Every admission is tagged with the state generation it was admitted in;
//!   an outcome reported after a transition (or a reset) updates the totals
//!   but never drives the state machine
//! - Cancellation-agnostic: timeouts are applied by the caller

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::observability::metrics;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The call was rejected without being invoked.
    #[error("circuit breaker is open")]
    Open,

    /// The wrapped call ran and failed.
    #[error(transparent)]
    Inner(E),
}

/// Administrative view of the breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_calls: u32,
    pub failure_threshold: u32,
    pub half_open_max_calls: u32,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    /// Milliseconds since the last recorded failure.
    pub ms_since_last_failure: Option<u64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    half_open_calls: u32,
    /// Bumped on every transition.
    generation: u64,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            half_open_calls: 0,
            generation: 0,
            total_calls: 0,
            total_successes: 0,
            total_failures: 0,
            total_rejections: 0,
        }
    }

    fn transition(&mut self, to: CircuitState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        self.half_open_calls = 0;
        self.generation += 1;

        match to {
            CircuitState::Open => tracing::warn!(
                from = from.as_str(),
                consecutive_failures = self.consecutive_failures,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => {
                tracing::info!(from = from.as_str(), "Circuit breaker half-open, admitting trial calls")
            }
            CircuitState::Closed => tracing::info!(from = from.as_str(), "Circuit breaker closed"),
        }
        metrics::record_circuit_state(to);
    }
}

/// Three-state failure-isolation gate around backend calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_calls: u32,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new breaker in the Closed state.
    pub fn new(failure_threshold: u32, recovery_timeout: Duration, half_open_max_calls: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            half_open_max_calls: half_open_max_calls.max(1),
            inner: Mutex::new(BreakerState::new()),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.circuit_breaker.failure_threshold,
            config.recovery_timeout(),
            config.circuit_breaker.half_open_max_calls,
        )
    }

    /// Run `f` through the breaker.
    ///
    /// Returns [`CircuitError::Open`] without invoking `f` while the breaker
    /// is rejecting calls.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(generation) = self.try_acquire() else {
            return Err(CircuitError::Open);
        };

        let mut guard = CallGuard {
            breaker: self,
            generation,
            settled: false,
        };
        let result = f().await;
        guard.settled = true;

        match result {
            Ok(value) => {
                self.on_success(generation);
                Ok(value)
            }
            Err(e) => {
                self.on_failure(generation);
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Current state, without applying any time-based transition.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let s = self.inner.lock();
        CircuitBreakerStats {
            state: s.state,
            consecutive_failures: s.consecutive_failures,
            half_open_calls: s.half_open_calls,
            failure_threshold: self.failure_threshold,
            half_open_max_calls: self.half_open_max_calls,
            total_calls: s.total_calls,
            total_successes: s.total_successes,
            total_failures: s.total_failures,
            total_rejections: s.total_rejections,
            ms_since_last_failure: s.last_failure.map(|t| t.elapsed().as_millis() as u64),
        }
    }

    /// Force the breaker back to Closed and clear failure bookkeeping.
    pub fn reset(&self) {
        let mut s = self.inner.lock();
        s.transition(CircuitState::Closed);
        s.consecutive_failures = 0;
        s.last_failure = None;
        s.half_open_calls = 0;
        // In-flight calls no longer count toward the state.
        s.generation += 1;
        tracing::info!("Circuit breaker reset");
    }

    /// Admit a call, returning the generation it was admitted in.
    fn try_acquire(&self) -> Option<u64> {
        let mut s = self.inner.lock();

        let admitted = match s.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let recovered = s
                    .last_failure
                    .map_or(true, |t| t.elapsed() >= self.recovery_timeout);
                if recovered {
                    s.transition(CircuitState::HalfOpen);
                    s.half_open_calls = 1;
                }
                recovered
            }
            CircuitState::HalfOpen => {
                if s.half_open_calls < self.half_open_max_calls {
                    s.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        };

        if admitted {
            s.total_calls += 1;
        } else {
            s.total_rejections += 1;
            tracing::debug!(state = s.state.as_str(), "Circuit breaker rejected call");
        }
        admitted.then_some(s.generation)
    }

    fn on_success(&self, generation: u64) {
        let mut s = self.inner.lock();
        s.total_successes += 1;
        if generation != s.generation {
            return;
        }
        match s.state {
            CircuitState::Closed => s.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                s.consecutive_failures = 0;
                s.transition(CircuitState::Closed);
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        let mut s = self.inner.lock();
        s.total_failures += 1;
        if generation != s.generation {
            tracing::debug!(state = s.state.as_str(), "Ignoring failure from an earlier circuit state");
            return;
        }
        s.consecutive_failures = s.consecutive_failures.saturating_add(1);
        s.last_failure = Some(Instant::now());

        match s.state {
            CircuitState::Closed if s.consecutive_failures >= self.failure_threshold => {
                s.transition(CircuitState::Open);
            }
            CircuitState::HalfOpen => s.transition(CircuitState::Open),
            _ => {}
        }
    }
}

/// Records a failure if the call is dropped before it settles.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_failure(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::BackendError;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn fail(cb: &CircuitBreaker) -> Result<u32, CircuitError<BackendError>> {
        cb.execute(|| async { Err(BackendError::Inference("boom".into())) })
            .await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32, CircuitError<BackendError>> {
        cb.execute(|| async { Ok::<_, BackendError>(1) }).await
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60), 1);

        for _ in 0..2 {
            assert!(matches!(fail(&cb).await, Err(CircuitError::Inner(_))));
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.stats().consecutive_failures, 3);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60), 1);
        let _ = fail(&cb).await;
        assert!(succeed(&cb).await.is_ok());
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_open_rejects_without_invoking() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60), 1);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;

        let calls = AtomicU32::new(0);
        let result = cb
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BackendError>(1)
            })
            .await;

        assert!(matches!(result, Err(CircuitError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.stats().total_rejections, 1);
    }

    #[tokio::test]
    async fn test_recovery_closes_on_trial_success() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(50), 1);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(succeed(&cb).await.unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_trial_failure_reopens() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(30), 2);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(fail(&cb).await, Err(CircuitError::Inner(_))));
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(succeed(&cb).await, Err(CircuitError::Open)));
    }

    #[tokio::test]
    async fn test_half_open_budget() {
        let cb = std::sync::Arc::new(CircuitBreaker::new(1, Duration::from_millis(20), 2));
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let mut trials = Vec::new();
        for _ in 0..2 {
            let cb = cb.clone();
            let mut rx = release_rx.clone();
            trials.push(tokio::spawn(async move {
                cb.execute(|| async move {
                    let _ = rx.wait_for(|released| *released).await;
                    Ok::<_, BackendError>(1)
                })
                .await
            }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.stats().half_open_calls, 2);
        // Budget exhausted: rejected, state unchanged.
        assert!(matches!(succeed(&cb).await, Err(CircuitError::Open)));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        release_tx.send(true).unwrap();
        for t in trials {
            assert!(t.await.unwrap().is_ok());
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_call_counts_as_failure() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(60), 1);
        let result = tokio::time::timeout(
            Duration::from_millis(10),
            cb.execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, BackendError>(1)
            }),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_call_admitted_while_closed_is_not_a_trial() {
        let cb = std::sync::Arc::new(CircuitBreaker::new(1, Duration::from_millis(20), 1));
        let (release_tx, mut release_rx) = tokio::sync::watch::channel(false);

        let slow = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.execute(|| async move {
                    let _ = release_rx.wait_for(|released| *released).await;
                    Ok::<_, BackendError>(1)
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(40)).await;

        // The trial is admitted and still pending when the older call returns.
        let (trial_tx, mut trial_rx) = tokio::sync::watch::channel(false);
        let trial = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.execute(|| async move {
                    let _ = trial_rx.wait_for(|released| *released).await;
                    Err::<u32, _>(BackendError::Inference("still down".into()))
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        release_tx.send(true).unwrap();
        assert!(slow.await.unwrap().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        trial_tx.send(true).unwrap();
        assert!(trial.await.unwrap().is_err());
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.stats().total_successes, 1);
    }

    #[tokio::test]
    async fn test_reset() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(60), 1);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 0);
        assert!(stats.ms_since_last_failure.is_none());
        assert!(succeed(&cb).await.is_ok());
    }
}
