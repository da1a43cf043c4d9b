//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use risk_engine::config::EngineConfig;
use risk_engine::engine::{
    BackendError, PredictionBackend, RiskAssessment, RiskLevel, RiskPrediction, RiskRequest,
    RiskTrend,
};

type Behaviour = dyn Fn(u32, RiskRequest) -> BoxFuture<'static, Result<f64, BackendError>> + Send + Sync;

/// Backend whose every call is decided by a closure.
///
/// The closure receives the zero-based call index and the request and returns
/// the score to report, or an error. Predictions reuse the same closure.
pub struct ProgrammableBackend {
    calls: AtomicU32,
    behaviour: Box<Behaviour>,
}

impl ProgrammableBackend {
    pub fn new<F, Fut>(f: F) -> Arc<Self>
    where
        F: Fn(u32, RiskRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<f64, BackendError>> + Send + 'static,
    {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            behaviour: Box::new(move |n, request| f(n, request).boxed()),
        })
    }

    /// Backend that always scores `score` after `delay`.
    pub fn fixed(score: f64, delay: Duration) -> Arc<Self> {
        Self::new(move |_, _| async move {
            tokio::time::sleep(delay).await;
            Ok(score)
        })
    }

    /// Backend that fails every request whose business name starts with `prefix`.
    pub fn failing_prefix(prefix: &'static str) -> Arc<Self> {
        Self::new(move |_, request| async move {
            if request.business_name.starts_with(prefix) {
                Err(BackendError::Inference(format!("rejected {}", request.business_name)))
            } else {
                Ok(42.0)
            }
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn call(&self, request: &RiskRequest) -> Result<f64, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.behaviour)(n, request.clone()).await
    }
}

#[async_trait]
impl PredictionBackend for ProgrammableBackend {
    async fn predict_risk(
        &self,
        model: &str,
        request: &RiskRequest,
    ) -> Result<RiskAssessment, BackendError> {
        let score = self.call(request).await?;
        Ok(RiskAssessment {
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
            confidence: 0.9,
            factors: Vec::new(),
            model: model.to_string(),
        })
    }

    async fn predict_future_risk(
        &self,
        model: &str,
        request: &RiskRequest,
        horizon_months: u32,
    ) -> Result<RiskPrediction, BackendError> {
        let score = self.call(request).await?;
        Ok(RiskPrediction {
            horizon_months,
            current_score: score,
            predicted_score: score,
            risk_level: RiskLevel::from_score(score),
            trend: RiskTrend::Stable,
            confidence: 0.8,
            model: model.to_string(),
        })
    }
}

pub fn request(name: &str) -> RiskRequest {
    RiskRequest::new(name, "1 Test Way", "Retail", "US")
}

/// Small, fast configuration for tests.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.execution.max_concurrent_requests = 8;
    config.execution.queue_capacity = 16;
    config.execution.request_timeout_ms = 200;
    config.execution.submit_timeout_ms = 100;
    config
}
