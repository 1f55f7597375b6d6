//! Job execution: workers and the pool that launches them.
//!
//! - [`JobWorker`](job_worker::JobWorker): claims one job at a time, runs it, reports the result
//! - [`WorkerPool`]: waits for the queue backend, then starts N workers,
//!   each named `<host>_<ordinal>` with its own queue connection

pub mod job_worker;
pub mod pool;

pub use pool::{PoolHandle, WorkerPool};
