//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend calls with the per-request timeout
//! - Honor the caller's cancellation scope at the same suspension point
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from cancellation and backend errors
//! - Cancellation wins over a simultaneous timeout

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::types::{EngineError, EngineResult};

/// Run `fut` bounded by `timeout` and by `scope`.
pub async fn with_deadline<F, T>(scope: &CancellationToken, timeout: Duration, fut: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    tokio::select! {
        biased;
        _ = scope.cancelled() => Err(EngineError::Cancelled),
        result = tokio::time::timeout(timeout, fut) => {
            result.unwrap_or(Err(EngineError::DeadlineExceeded(timeout)))
        }
    }
}
