//! The engine orchestrating cache, breaker, timeouts, pool and metrics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::cache::{CacheStats, Fingerprint, NoopCache, ResultCache, TtlCache};
use crate::config::EngineConfig;
use crate::engine::backend::PredictionBackend;
use crate::engine::types::{
    BackendError, BatchOutcome, CachedValue, EngineError, EngineResult, RiskAssessment,
    RiskPrediction, RiskRequest,
};
use crate::execution::{PoolStats, WorkerPool};
use crate::observability::{check_thresholds, HealthReport, MetricsCollector, MetricsSnapshot};
use crate::resilience::{with_deadline, CircuitBreaker, CircuitBreakerStats, CircuitError, CircuitState};

const ASSESS_OPERATION: &str = "risk assessment";
const PREDICT_OPERATION: &str = "risk prediction";

struct EngineInner {
    config: EngineConfig,
    backend: Arc<dyn PredictionBackend>,
    cache: Arc<dyn ResultCache<CachedValue>>,
    breaker: CircuitBreaker,
    pool: WorkerPool<RiskAssessment>,
    metrics: Option<MetricsCollector>,
    shut_down: AtomicBool,
}

impl EngineInner {
    fn record(&self, f: impl FnOnce(&MetricsCollector)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }

    fn record_failure(&self, operation: &'static str, error: &EngineError) {
        self.record(|m| m.record_error_with_type(error.kind().as_str()));
        match error {
            EngineError::CircuitOpen | EngineError::Cancelled => {
                tracing::debug!(operation, error = %error, "Request rejected")
            }
            _ => tracing::warn!(operation, kind = error.kind().as_str(), error = %error, "Request failed"),
        }
    }

    /// Take responsibility for counting a request's outcome. Batch items
    /// share a flag with the batch so whichever side settles first counts.
    fn claim(slot: Option<&AtomicBool>) -> bool {
        slot.map_or(true, |claimed| !claimed.swap(true, Ordering::SeqCst))
    }

    fn lookup(&self, key: &Fingerprint) -> Option<CachedValue> {
        let hit = self.cache.get(key);
        if hit.is_some() {
            tracing::debug!(fingerprint = %key, "Cache hit");
            self.record(|m| m.record_cache_hit());
        } else {
            self.record(|m| m.record_cache_miss());
        }
        hit
    }
}

/// Resilient execution engine in front of a prediction backend.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RiskEngine {
    inner: Arc<EngineInner>,
}

impl RiskEngine {
    /// Build an engine from configuration.
    ///
    /// Starts the worker pool and the cache sweeper, so it must be called
    /// from within a Tokio runtime.
    pub fn new(config: EngineConfig, backend: Arc<dyn PredictionBackend>) -> Self {
        let cache: Arc<dyn ResultCache<CachedValue>> = if config.cache.enabled {
            Arc::new(TtlCache::new(
                config.cache_ttl(),
                config.cache.max_size,
                config.cache_cleanup_interval(),
            ))
        } else {
            Arc::new(NoopCache::new())
        };

        let pool = WorkerPool::new(
            config.execution.max_concurrent_requests,
            config.execution.queue_capacity,
        );
        let breaker = CircuitBreaker::from_config(&config);
        let metrics = config
            .observability
            .metrics_enabled
            .then(MetricsCollector::new);

        tracing::info!(
            workers = config.execution.max_concurrent_requests,
            request_timeout_ms = config.execution.request_timeout_ms,
            caching = config.cache.enabled,
            cache_ttl_secs = config.cache.ttl_secs,
            failure_threshold = config.circuit_breaker.failure_threshold,
            model = %config.execution.model_selector,
            "Risk engine started"
        );

        Self {
            inner: Arc::new(EngineInner {
                config,
                backend,
                cache,
                breaker,
                pool,
                metrics,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Score one request.
    ///
    /// Cache hits return immediately. Otherwise the backend is called through
    /// the circuit breaker, bounded by the request timeout and by `scope`.
    pub async fn assess_risk(
        &self,
        scope: &CancellationToken,
        request: &RiskRequest,
    ) -> EngineResult<RiskAssessment> {
        self.assess(scope, request, None).await
    }

    async fn assess(
        &self,
        scope: &CancellationToken,
        request: &RiskRequest,
        accounted: Option<&AtomicBool>,
    ) -> EngineResult<RiskAssessment> {
        let inner = &self.inner;
        let key = Fingerprint::for_assessment(request);

        if let Some(CachedValue::Assessment(hit)) = inner.lookup(&key) {
            return Ok(hit);
        }

        let start = Instant::now();
        let model = inner.config.execution.model_selector.as_str();
        let result = with_deadline(scope, inner.config.request_timeout(), async {
            inner
                .breaker
                .execute(|| inner.backend.predict_risk(model, request))
                .await
                .map_err(|e| from_circuit(ASSESS_OPERATION, e))
        })
        .await;

        match result {
            Ok(assessment) => {
                inner.cache.set(&key, CachedValue::Assessment(assessment.clone()));
                if EngineInner::claim(accounted) {
                    inner.record(|m| m.record_request(start.elapsed()));
                }
                Ok(assessment)
            }
            Err(error) => {
                if EngineInner::claim(accounted) {
                    inner.record_failure(ASSESS_OPERATION, &error);
                }
                Err(error)
            }
        }
    }

    /// Score a batch of requests concurrently on the worker pool.
    ///
    /// Results are index-aligned with `requests`. A batch larger than the
    /// worker count is rejected whole; otherwise per-item failures are
    /// reported in the outcome (see [`BatchOutcome::error`]).
    pub async fn assess_risk_batch(
        &self,
        scope: &CancellationToken,
        requests: Vec<RiskRequest>,
    ) -> EngineResult<BatchOutcome> {
        let inner = &self.inner;
        let max = inner.pool.workers();
        if requests.len() > max {
            return Err(EngineError::BatchTooLarge {
                size: requests.len(),
                max,
            });
        }
        if requests.is_empty() {
            return Ok(BatchOutcome { items: Vec::new() });
        }

        let start = Instant::now();
        let item_count = requests.len();
        let batch_timeout = inner.config.batch_timeout();
        let batch_scope = scope.child_token();

        let deadline = {
            let batch_scope = batch_scope.clone();
            tokio::spawn(async move {
                tokio::time::sleep(batch_timeout).await;
                batch_scope.cancel();
            })
        };

        // Items observe cancellation through their job, which drops them
        // mid-call; outcomes they never report are counted after the join.
        let detached = CancellationToken::new();
        let accounted: Vec<Arc<AtomicBool>> =
            (0..item_count).map(|_| Arc::new(AtomicBool::new(false))).collect();

        let tasks: Vec<_> = requests
            .into_iter()
            .zip(&accounted)
            .map(|(request, accounted)| {
                let engine = self.clone();
                let detached = detached.clone();
                let accounted = accounted.clone();
                move || async move {
                    engine
                        .assess(&detached, &request, Some(accounted.as_ref()))
                        .await
                }
            })
            .collect();

        let mut items = inner
            .pool
            .execute_batch(&batch_scope, tasks, inner.config.submit_timeout())
            .await;
        deadline.abort();

        let deadline_hit = batch_scope.is_cancelled() && !scope.is_cancelled();
        for (item, accounted) in items.iter_mut().zip(&accounted) {
            if let Err(EngineError::Cancelled) = item {
                if deadline_hit {
                    *item = Err(EngineError::DeadlineExceeded(batch_timeout));
                }
            }
            if let Err(error) = item {
                if EngineInner::claim(Some(accounted.as_ref())) {
                    inner.record(|m| m.record_error_with_type(error.kind().as_str()));
                }
            }
        }

        let outcome = BatchOutcome { items };
        inner.record(|m| m.record_batch_request(start.elapsed(), item_count));

        let failed = outcome.failure_count();
        if failed > 0 {
            tracing::warn!(items = item_count, failed, "Batch completed with failures");
        } else {
            tracing::debug!(items = item_count, elapsed = ?start.elapsed(), "Batch completed");
        }
        Ok(outcome)
    }

    /// Forecast risk `horizon_months` ahead.
    ///
    /// Same cache, breaker, timeout and metrics path as [`assess_risk`],
    /// keyed additionally by horizon.
    ///
    /// [`assess_risk`]: RiskEngine::assess_risk
    pub async fn predict_risk(
        &self,
        scope: &CancellationToken,
        request: &RiskRequest,
        horizon_months: u32,
    ) -> EngineResult<RiskPrediction> {
        let inner = &self.inner;
        let key = Fingerprint::for_prediction(request, horizon_months);

        if let Some(CachedValue::Prediction(hit)) = inner.lookup(&key) {
            return Ok(hit);
        }

        let start = Instant::now();
        let model = inner.config.execution.model_selector.as_str();
        let result = with_deadline(scope, inner.config.request_timeout(), async {
            inner
                .breaker
                .execute(|| inner.backend.predict_future_risk(model, request, horizon_months))
                .await
                .map_err(|e| from_circuit(PREDICT_OPERATION, e))
        })
        .await;

        match result {
            Ok(prediction) => {
                inner.cache.set(&key, CachedValue::Prediction(prediction.clone()));
                inner.record(|m| m.record_request(start.elapsed()));
                Ok(prediction)
            }
            Err(error) => {
                inner.record_failure(PREDICT_OPERATION, &error);
                Err(error)
            }
        }
    }

    /// Metrics snapshot, or `None` when metrics are disabled.
    pub fn get_metrics(&self) -> Option<MetricsSnapshot> {
        self.inner.metrics.as_ref().map(MetricsCollector::get_stats)
    }

    pub fn reset_metrics(&self) {
        self.inner.record(MetricsCollector::reset);
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn get_circuit_breaker_state(&self) -> CircuitState {
        self.inner.breaker.state()
    }

    pub fn get_circuit_breaker_stats(&self) -> CircuitBreakerStats {
        self.inner.breaker.stats()
    }

    /// Force the circuit breaker closed.
    pub fn reset_circuit_breaker(&self) {
        self.inner.breaker.reset();
    }

    pub fn get_pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Current metrics checked against the configured thresholds, or `None`
    /// when metrics are disabled.
    pub fn health_check(&self) -> Option<HealthReport> {
        self.get_metrics()
            .map(|snapshot| check_thresholds(&snapshot, &self.inner.config.thresholds))
    }

    /// Stop the worker pool (bounded by `deadline`) and clear the cache.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn shutdown(&self, deadline: Duration) -> EngineResult<()> {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!(deadline = ?deadline, "Risk engine shutting down");
        let result = self.inner.pool.shutdown(deadline).await;
        self.inner.cache.clear();
        self.inner.cache.close();
        tracing::info!("Risk engine shut down");
        result
    }
}

fn from_circuit(operation: &'static str, error: CircuitError<BackendError>) -> EngineError {
    match error {
        CircuitError::Open => EngineError::CircuitOpen,
        CircuitError::Inner(source) => EngineError::Backend { operation, source },
    }
}
