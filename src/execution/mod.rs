//! Execution subsystem.
//!
//! # Data Flow
//! ```text
//! Batch of requests
//!     → job.rs (one Job per item: task + id + caller scope + completion handle)
//!     → worker_pool.rs (bounded queue → dispatcher → idle worker)
//!     → JobHandle::wait (results joined back by input index)
//! ```
//!
//! # Design Decisions
//! - Fixed number of long-lived workers, started with the engine
//! - Bounded queue: saturation is reported, never absorbed
//! - Workers check the caller's cancellation scope before running a job
//! - Every submitted job gets exactly one result, even across shutdown

pub mod job;
pub mod worker_pool;

pub use job::{Job, JobHandle, JobResult, Task};
pub use worker_pool::{PoolStats, WorkerPool};
