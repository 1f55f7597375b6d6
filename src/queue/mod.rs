//! Client side of the distributed job queue.
//!
//! The broker itself (storage, delivery, claim exclusivity) is an external
//! Redis server; this module only speaks to it.
//!
//! - [`QueueBackend`]: opens connections. Every worker opens its own.
//! - [`JobQueue`]: one connection; enqueue, claim, publish and look up jobs.
//!
//! Connection failures are returned to the caller and never retried here.

#[cfg(test)]
pub mod memory;
pub mod redis_queue;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::api::job::models::{JobKind, JobResult, QueuedJob};

pub use redis_queue::RedisBackend;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend unreachable: {0}")]
    Unavailable(String),

    #[error("queue command failed: {0}")]
    Command(String),

    #[error("malformed queue payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl QueueError {
    /// A bad payload only spoils one job; the connection is still usable
    pub fn is_fatal(&self) -> bool {
        !matches!(self, QueueError::Decode(_))
    }
}

/// Where an admitted job currently stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Unknown,
    Queued { kind: JobKind },
    Running { kind: JobKind, worker: String },
    Finished(JobResult),
}

impl JobState {
    /// Endpoint the job was admitted through; `None` for unknown jobs
    pub fn kind(&self) -> Option<JobKind> {
        match self {
            JobState::Unknown => None,
            JobState::Queued { kind } | JobState::Running { kind, .. } => Some(*kind),
            JobState::Finished(result) => Some(result.kind),
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push a job without waiting for any consumer
    async fn enqueue(&self, queue: &str, job: &QueuedJob) -> Result<(), QueueError>;

    /// Block until a job is available on any of `queues` or `timeout` elapses.
    ///
    /// `Ok(None)` is a timeout, not an error.
    async fn claim(&self, queues: &[String], timeout: Duration) -> Result<Option<QueuedJob>, QueueError>;

    /// Record that `worker` owns the job
    async fn mark_running(&self, job: &QueuedJob, worker: &str) -> Result<(), QueueError>;

    /// Store the final result; publishing twice for one id overwrites
    async fn publish_result(&self, result: &JobResult) -> Result<(), QueueError>;

    async fn lookup(&self, job_id: Uuid) -> Result<JobState, QueueError>;

    async fn ping(&self) -> Result<(), QueueError>;
}

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Open a new, unshared connection
    async fn connect(&self) -> Result<Box<dyn JobQueue>, QueueError>;

    /// Printable address for logs
    fn describe(&self) -> String;
}
