//! Bounded-concurrency worker pool.
//!
//! # Responsibilities
//! - Start a fixed set of long-lived workers at construction
//! - Accept jobs onto a bounded queue (fail fast or wait with a timeout)
//! - Hand queued jobs to idle workers
//! - Fan out batches and join their results by index
//! - Stop workers on shutdown, bounded by a deadline
//!
//! # Dispatch
//! ```text
//! submit ──▶ [bounded queue] ──▶ dispatcher ──▶ idle worker's inbox ──▶ job.run()
//!                                    ▲                                     │
//!                                    └──────── worker re-registers ◀───────┘
//! ```
//! A worker registers its inbox on the idle channel whenever it is free. The
//! dispatcher waits for an idle worker before taking the next job, so at most
//! `queue_capacity` jobs are ever waiting.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::types::{EngineError, EngineResult};
use crate::execution::job::Job;
use crate::observability::metrics;

type Inbox<T> = mpsc::Sender<Job<T>>;

#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Jobs waiting for a worker.
    pub queued: usize,
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
    pub shut_down: bool,
}

/// Fixed-size pool of workers running [`Job`]s.
#[derive(Debug)]
pub struct WorkerPool<T> {
    queue: mpsc::Sender<Job<T>>,
    workers: usize,
    queue_capacity: usize,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Start `workers` workers and the dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);

        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
        let (idle_tx, idle_rx) = mpsc::channel(workers);
        let shutdown = CancellationToken::new();
        let counters = Arc::new(PoolCounters::default());

        let mut tasks = Vec::with_capacity(workers + 1);
        for worker_id in 0..workers {
            tasks.push(tokio::spawn(worker_loop(
                worker_id,
                idle_tx.clone(),
                shutdown.clone(),
                counters.clone(),
            )));
        }
        tasks.push(tokio::spawn(dispatch_loop(queue_rx, idle_rx, shutdown.clone())));

        tracing::info!(workers, queue_capacity, "Worker pool started");

        Self {
            queue: queue_tx,
            workers,
            queue_capacity,
            shutdown,
            tasks: Mutex::new(tasks),
            counters,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Enqueue a job without waiting.
    ///
    /// A saturated queue fails the job immediately with `QueueFull`, delivered
    /// through its handle and returned here.
    pub fn submit(&self, job: Job<T>) -> EngineResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(self.reject(job, EngineError::PoolShutdown));
        }

        match self.queue.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                tracing::warn!(job_id = %job.id(), "Worker pool queue full, rejecting job");
                Err(self.reject(job, EngineError::QueueFull))
            }
            Err(TrySendError::Closed(job)) => Err(self.reject(job, EngineError::PoolShutdown)),
        }
    }

    /// Enqueue a job, waiting up to `wait` for queue capacity.
    pub async fn submit_with_timeout(&self, job: Job<T>, wait: Duration) -> EngineResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(self.reject(job, EngineError::PoolShutdown));
        }

        match tokio::time::timeout(wait, self.queue.reserve()).await {
            Ok(Ok(permit)) => {
                permit.send(job);
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(_)) => Err(self.reject(job, EngineError::PoolShutdown)),
            Err(_) => {
                tracing::warn!(job_id = %job.id(), wait = ?wait, "Timed out waiting for queue capacity");
                Err(self.reject(job, EngineError::SubmissionTimeout(wait)))
            }
        }
    }

    /// Run one job per task and return their results in input order.
    ///
    /// Each submission waits at most `submit_timeout` for queue capacity.
    /// Items still outstanding when `scope` is cancelled report `Cancelled`.
    pub async fn execute_batch<F, Fut>(
        &self,
        scope: &CancellationToken,
        tasks: Vec<F>,
        submit_timeout: Duration,
    ) -> Vec<EngineResult<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = EngineResult<T>> + Send + 'static,
    {
        let mut slots: Vec<Option<EngineResult<T>>> = Vec::with_capacity(tasks.len());
        let mut pending = FuturesUnordered::new();

        for (index, task) in tasks.into_iter().enumerate() {
            slots.push(None);
            let (job, handle) = Job::new(scope.clone(), task);
            // Submission errors are delivered through the handle.
            let _ = self.submit_with_timeout(job, submit_timeout).await;
            pending.push(async move { (index, handle.wait().await) });
        }

        loop {
            tokio::select! {
                biased;
                _ = scope.cancelled() => break,
                next = pending.next() => match next {
                    Some((index, job_result)) => slots[index] = Some(job_result.result),
                    None => break,
                },
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(EngineError::Cancelled)))
            .collect()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            queued: self.queue_capacity - self.queue.capacity(),
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            shut_down: self.shutdown.is_cancelled(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop all workers after their current job and wait up to `deadline`.
    ///
    /// Jobs still queued are failed with `PoolShutdown`. Calling this again
    /// returns immediately.
    pub async fn shutdown(&self, deadline: Duration) -> EngineResult<()> {
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return Ok(());
        }

        let joined = tokio::time::timeout(deadline, futures_util::future::join_all(tasks)).await;
        match joined {
            Ok(_) => {
                tracing::info!("Worker pool stopped");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(deadline = ?deadline, "Worker pool did not stop before deadline");
                Err(EngineError::DeadlineExceeded(deadline))
            }
        }
    }

    fn reject(&self, job: Job<T>, error: EngineError) -> EngineError {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        metrics::record_pool_rejection(error.kind());
        job.fail(error.clone());
        error
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn worker_loop<T: Send + 'static>(
    worker_id: usize,
    idle: mpsc::Sender<Inbox<T>>,
    shutdown: CancellationToken,
    counters: Arc<PoolCounters>,
) {
    let (inbox_tx, mut inbox) = mpsc::channel::<Job<T>>(1);

    loop {
        if idle.send(inbox_tx.clone()).await.is_err() {
            break;
        }

        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = inbox.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        tracing::trace!(worker_id, job_id = %job.id(), "Worker running job");
        job.run().await;
        counters.completed.fetch_add(1, Ordering::Relaxed);
    }

    // A job may have been handed over as shutdown fired.
    inbox.close();
    while let Ok(job) = inbox.try_recv() {
        job.fail(EngineError::PoolShutdown);
    }
    tracing::trace!(worker_id, "Worker stopped");
}

async fn dispatch_loop<T: Send + 'static>(
    mut queue: mpsc::Receiver<Job<T>>,
    mut idle: mpsc::Receiver<Inbox<T>>,
    shutdown: CancellationToken,
) {
    loop {
        let worker = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            worker = idle.recv() => match worker {
                Some(worker) => worker,
                None => {
                    tracing::error!("All workers exited, dispatcher stopping");
                    break;
                }
            },
        };

        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = queue.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        if let Err(mpsc::error::SendError(job)) = worker.send(job).await {
            job.fail(EngineError::PoolShutdown);
        }
    }

    queue.close();
    while let Ok(job) = queue.try_recv() {
        job.fail(EngineError::PoolShutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Semaphore;

    fn blocked_job(gate: Arc<Semaphore>) -> (Job<u32>, crate::execution::job::JobHandle<u32>) {
        Job::new(CancellationToken::new(), move || async move {
            let _permit = gate.acquire().await;
            Ok(0)
        })
    }

    #[tokio::test]
    async fn test_submit_and_complete() {
        let pool = WorkerPool::new(4, 8);
        let mut handles = Vec::new();
        for i in 0..6u32 {
            let (job, handle) =
                Job::with_id(format!("job-{}", i), CancellationToken::new(), move || async move { Ok(i * 2) });
            pool.submit(job).unwrap();
            handles.push(handle);
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.wait().await;
            assert_eq!(result.id, format!("job-{}", i));
            assert_eq!(result.result.unwrap(), i as u32 * 2);
        }

        let stats = pool.stats();
        assert_eq!(stats.submitted, 6);
        assert_eq!(stats.rejected, 0);
        pool.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_full_rejects_excess() {
        let pool = WorkerPool::new(1, 2);
        let gate = Arc::new(Semaphore::new(0));

        let (busy, busy_handle) = blocked_job(gate.clone());
        pool.submit(busy).unwrap();
        // Let the single worker pick it up.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut accepted = Vec::new();
        for _ in 0..2 {
            let (job, handle) = blocked_job(gate.clone());
            pool.submit(job).unwrap();
            accepted.push(handle);
        }

        let (excess, excess_handle) = blocked_job(gate.clone());
        assert!(matches!(pool.submit(excess), Err(EngineError::QueueFull)));
        assert!(matches!(excess_handle.wait().await.result, Err(EngineError::QueueFull)));
        assert_eq!(pool.stats().queued, 2);

        gate.add_permits(10);
        assert!(busy_handle.wait().await.result.is_ok());
        for handle in accepted {
            assert!(handle.wait().await.result.is_ok());
        }
        assert_eq!(pool.stats().rejected, 1);
        pool.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_with_timeout() {
        let pool = WorkerPool::new(1, 1);
        let gate = Arc::new(Semaphore::new(0));

        let (busy, _busy_handle) = blocked_job(gate.clone());
        pool.submit(busy).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (queued, _queued_handle) = blocked_job(gate.clone());
        pool.submit(queued).unwrap();

        let (late, late_handle) = blocked_job(gate.clone());
        let result = pool.submit_with_timeout(late, Duration::from_millis(30)).await;
        assert!(matches!(result, Err(EngineError::SubmissionTimeout(_))));
        assert!(matches!(
            late_handle.wait().await.result,
            Err(EngineError::SubmissionTimeout(_))
        ));

        gate.add_permits(10);
        let (job, handle) = Job::new(CancellationToken::new(), || async { Ok(5) });
        pool.submit_with_timeout(job, Duration::from_secs(1)).await.unwrap();
        assert_eq!(handle.wait().await.result.unwrap(), 5);
        pool.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_scope_skips_job() {
        let pool = WorkerPool::new(2, 4);
        let runs = Arc::new(AtomicU32::new(0));
        let scope = CancellationToken::new();
        scope.cancel();

        let counter = runs.clone();
        let (job, handle) = Job::new(scope, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1u32)
        });
        pool.submit(job).unwrap();

        assert!(matches!(handle.wait().await.result, Err(EngineError::Cancelled)));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        pool.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_batch_preserves_order() {
        let pool = WorkerPool::new(4, 8);
        let scope = CancellationToken::new();

        let tasks: Vec<_> = (0..6u64)
            .map(|i| {
                move || async move {
                    // Later items finish first.
                    tokio::time::sleep(Duration::from_millis(60 - i * 10)).await;
                    if i % 3 == 2 {
                        Err(EngineError::CircuitOpen)
                    } else {
                        Ok(i as u32)
                    }
                }
            })
            .collect();

        let results = pool.execute_batch(&scope, tasks, Duration::from_millis(100)).await;
        assert_eq!(results.len(), 6);
        for (i, result) in results.iter().enumerate() {
            if i % 3 == 2 {
                assert!(matches!(result, Err(EngineError::CircuitOpen)));
            } else {
                assert_eq!(*result.as_ref().unwrap(), i as u32);
            }
        }
        pool.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_batch_cancelled() {
        let pool = WorkerPool::new(2, 4);
        let scope = CancellationToken::new();

        let tasks: Vec<_> = (0..2u32)
            .map(|i| {
                move || async move {
                    if i == 1 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok(i)
                }
            })
            .collect();

        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let results = pool.execute_batch(&scope, tasks, Duration::from_millis(100)).await;
        assert_eq!(*results[0].as_ref().unwrap(), 0);
        assert!(matches!(results[1], Err(EngineError::Cancelled)));
        pool.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_rejects() {
        let pool: WorkerPool<u32> = WorkerPool::new(2, 2);
        pool.shutdown(Duration::from_secs(1)).await.unwrap();
        pool.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(pool.is_shut_down());

        let (job, handle) = Job::new(CancellationToken::new(), || async { Ok(1) });
        assert!(matches!(pool.submit(job), Err(EngineError::PoolShutdown)));
        assert!(matches!(handle.wait().await.result, Err(EngineError::PoolShutdown)));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_current_job() {
        let pool = WorkerPool::new(1, 2);
        let (job, handle) = Job::new(CancellationToken::new(), || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(9u32)
        });
        pool.submit(job).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        pool.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(handle.wait().await.result.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_shutdown_deadline() {
        let pool = WorkerPool::new(1, 2);
        let (job, _handle) = Job::new(CancellationToken::new(), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1u32)
        });
        pool.submit(job).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = pool.shutdown(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(EngineError::DeadlineExceeded(_))));
    }
}
