//! Request/result types and error definitions for the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An inbound risk-scoring request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRequest {
    pub business_name: String,
    pub address: String,
    pub industry: String,
    /// ISO country code or name.
    pub country: String,
    #[serde(default)]
    pub annual_revenue: Option<f64>,
    #[serde(default)]
    pub employee_count: Option<u32>,
    #[serde(default)]
    pub years_in_business: Option<u32>,
}

impl RiskRequest {
    /// Create a request from its identifying fields.
    pub fn new(
        business_name: impl Into<String>,
        address: impl Into<String>,
        industry: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            business_name: business_name.into(),
            address: address.into(),
            industry: industry.into(),
            country: country.into(),
            annual_revenue: None,
            employee_count: None,
            years_in_business: None,
        }
    }
}

/// Coarse risk band derived from a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Band a 0-100 score.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 80.0 => RiskLevel::Critical,
            s if s >= 60.0 => RiskLevel::High,
            s if s >= 30.0 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

/// A single contribution to a risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    /// Signed contribution to the score.
    pub impact: f64,
    pub description: String,
}

/// Scored result returned for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Score in the 0-100 range.
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    /// Model confidence (0.0 - 1.0).
    pub confidence: f64,
    pub factors: Vec<RiskFactor>,
    /// Model that produced the score.
    pub model: String,
}

/// Direction a forecast is heading in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTrend {
    Improving,
    Stable,
    Deteriorating,
}

/// Longer-horizon forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPrediction {
    pub horizon_months: u32,
    pub current_score: f64,
    pub predicted_score: f64,
    pub risk_level: RiskLevel,
    pub trend: RiskTrend,
    pub confidence: f64,
    pub model: String,
}

/// Value stored in the engine's result cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Assessment(RiskAssessment),
    Prediction(RiskPrediction),
}

/// Errors reported by a prediction backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Stable label for every engine error, used in metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    QueueFull,
    SubmissionTimeout,
    CircuitOpen,
    Backend,
    DeadlineExceeded,
    Cancelled,
    PoolShutdown,
    BatchTooLarge,
    Batch,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::QueueFull => "queue_full",
            ErrorKind::SubmissionTimeout => "submission_timeout",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Backend => "backend",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::PoolShutdown => "pool_shutdown",
            ErrorKind::BatchTooLarge => "batch_too_large",
            ErrorKind::Batch => "batch",
        }
    }
}

/// Errors that can occur while executing a request.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Worker pool queue is saturated.
    #[error("worker pool queue is full")]
    QueueFull,

    /// Waiting for queue capacity took too long.
    #[error("timed out after {0:?} waiting for queue capacity")]
    SubmissionTimeout(Duration),

    /// Circuit breaker is rejecting calls to protect the backend.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The prediction backend returned an error.
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        source: BackendError,
    },

    /// The per-request timeout expired mid-call.
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// The caller's cancellation scope fired.
    #[error("request cancelled")]
    Cancelled,

    /// The worker pool no longer accepts or runs jobs.
    #[error("worker pool is shut down")]
    PoolShutdown,

    /// Batch exceeds the pool's concurrency limit.
    #[error("batch of {size} requests exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// One or more batch items failed.
    #[error(transparent)]
    Batch(#[from] BatchError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::QueueFull => ErrorKind::QueueFull,
            EngineError::SubmissionTimeout(_) => ErrorKind::SubmissionTimeout,
            EngineError::CircuitOpen => ErrorKind::CircuitOpen,
            EngineError::Backend { .. } => ErrorKind::Backend,
            EngineError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::PoolShutdown => ErrorKind::PoolShutdown,
            EngineError::BatchTooLarge { .. } => ErrorKind::BatchTooLarge,
            EngineError::Batch(_) => ErrorKind::Batch,
        }
    }

    /// True when the circuit breaker rejected the call without reaching the backend.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, EngineError::CircuitOpen)
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Aggregate error for a batch with per-item attribution.
#[derive(Debug, Clone, Error)]
#[error("{} of {total} batch items failed", .failures.len())]
pub struct BatchError {
    /// Number of items in the batch.
    pub total: usize,
    /// Input index and error of each failed item.
    pub failures: Vec<(usize, EngineError)>,
}

/// Index-aligned results of a batch call.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub items: Vec<EngineResult<RiskAssessment>>,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.items.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.items.len() - self.success_count()
    }

    /// Aggregate error, present when at least one item failed.
    pub fn error(&self) -> Option<BatchError> {
        let failures: Vec<_> = self
            .items
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e.clone())))
            .collect();

        if failures.is_empty() {
            None
        } else {
            Some(BatchError {
                total: self.items.len(),
                failures,
            })
        }
    }

    /// Split into the successful assessments (in input order) and the aggregate error.
    pub fn into_parts(self) -> (Vec<RiskAssessment>, Option<EngineError>) {
        let error = self.error().map(EngineError::Batch);
        let successes = self.items.into_iter().filter_map(Result::ok).collect();
        (successes, error)
    }
}
