//! Units of work dispatched through the worker pool.

use std::future::Future;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::types::{EngineError, EngineResult};

/// Opaque zero-argument async function producing a result.
pub type Task<T> = Box<dyn FnOnce() -> BoxFuture<'static, EngineResult<T>> + Send>;

/// Outcome of a job, correlated by identifier.
#[derive(Debug)]
pub struct JobResult<T> {
    pub id: String,
    pub result: EngineResult<T>,
}

/// A job waiting to run.
pub struct Job<T> {
    id: String,
    task: Task<T>,
    scope: CancellationToken,
    done: oneshot::Sender<JobResult<T>>,
}

impl<T: Send + 'static> Job<T> {
    /// Create a job with a generated identifier.
    ///
    /// Returns the job and the caller-owned handle its result is delivered to.
    pub fn new<F, Fut>(scope: CancellationToken, f: F) -> (Self, JobHandle<T>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = EngineResult<T>> + Send + 'static,
    {
        Self::with_id(Uuid::new_v4().to_string(), scope, f)
    }

    pub fn with_id<F, Fut>(id: impl Into<String>, scope: CancellationToken, f: F) -> (Self, JobHandle<T>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = EngineResult<T>> + Send + 'static,
    {
        let id = id.into();
        let (done, rx) = oneshot::channel();
        let job = Self {
            id: id.clone(),
            task: Box::new(move || f().boxed()),
            scope,
            done,
        };
        (job, JobHandle { id, rx })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the task unless the caller's scope is already cancelled.
    pub(crate) async fn run(self) {
        let Job {
            id,
            task,
            scope,
            done,
        } = self;

        let result = if scope.is_cancelled() {
            tracing::debug!(job_id = %id, "Job cancelled before start");
            Err(EngineError::Cancelled)
        } else {
            tokio::select! {
                biased;
                _ = scope.cancelled() => Err(EngineError::Cancelled),
                result = task() => result,
            }
        };

        // The caller may have stopped waiting.
        let _ = done.send(JobResult { id, result });
    }

    /// Deliver a result without running the task.
    pub(crate) fn fail(self, error: EngineError) {
        let _ = self.done.send(JobResult {
            id: self.id,
            result: Err(error),
        });
    }
}

impl<T> std::fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Caller-owned completion handle for a submitted job.
#[derive(Debug)]
pub struct JobHandle<T> {
    id: String,
    rx: oneshot::Receiver<JobResult<T>>,
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the job's result.
    ///
    /// A job dropped by the pool without a result reports `PoolShutdown`.
    pub async fn wait(self) -> JobResult<T> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => JobResult {
                id: self.id,
                result: Err(EngineError::PoolShutdown),
            },
        }
    }
}
