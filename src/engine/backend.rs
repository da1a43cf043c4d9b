//! Prediction backend interface.

use async_trait::async_trait;

use crate::engine::types::{BackendError, RiskAssessment, RiskPrediction, RiskRequest};

/// The scoring service the engine protects.
///
/// Implementations may be slow or fail; the engine bounds every call with a
/// timeout and stops polling the returned future once it expires or the
/// caller cancels, so implementations should not rely on running to
/// completion.
#[async_trait]
pub trait PredictionBackend: Send + Sync {
    /// Score a request now. `model` selects the model (`"auto"` lets the
    /// backend choose).
    async fn predict_risk(
        &self,
        model: &str,
        request: &RiskRequest,
    ) -> Result<RiskAssessment, BackendError>;

    /// Forecast risk `horizon_months` ahead.
    async fn predict_future_risk(
        &self,
        model: &str,
        request: &RiskRequest,
        horizon_months: u32,
    ) -> Result<RiskPrediction, BackendError>;
}
