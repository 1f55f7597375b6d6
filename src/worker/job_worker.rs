use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::job::models::{JobKind, JobResult, QueuedJob};
use crate::device::{DeviceConnector, DeviceSession, DeviceTarget, ExecutionError};
use crate::queue::{JobQueue, QueueError};

/// Name and queue set of one worker, fixed at pool launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub name: String,
    pub queues: Vec<String>,
}

impl WorkerIdentity {
    pub fn new(host_identity: &str, ordinal: usize, queues: Vec<String>) -> Self {
        Self {
            name: format!("{}_{}", host_identity, ordinal),
            queues,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Claiming,
    Executing,
    Reporting,
    Stopped,
}

/// Claims one job at a time and runs it against its device
///
/// # Loop
/// `Idle → Claiming → Executing → Reporting → Idle` until shutdown is
/// signalled. A claim timeout returns to `Idle` with no side effects.
///
/// # Failures
/// - Device failures never leave the worker: they become a `failure` result.
/// - Queue failures on claim or publish end the run with an error; the
///   worker must not sit "idle" on a dead connection.
/// - A failed `running` marker is only logged. The claimed job still runs.
pub struct JobWorker {
    identity: WorkerIdentity,
    queue: Box<dyn JobQueue>,
    connector: Arc<dyn DeviceConnector>,
    claim_timeout: Duration,
    state: WorkerState,
    processed: u64,
}

impl JobWorker {
    /// `queue` must be a connection owned by this worker alone
    pub fn new(
        identity: WorkerIdentity,
        queue: Box<dyn JobQueue>,
        connector: Arc<dyn DeviceConnector>,
        claim_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            queue,
            connector,
            claim_timeout,
            state: WorkerState::Idle,
            processed: 0,
        }
    }

    #[cfg(test)]
    fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(worker = %self.identity.name, from = ?self.state, to = ?next, "Worker state change");
        self.state = next;
    }

    /// Work until `shutdown` turns true. Returns the number of jobs reported.
    ///
    /// Shutdown is only checked between claims; a job already claimed is
    /// always executed and reported.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<u64, QueueError> {
        info!(
            worker = %self.identity.name,
            queues = ?self.identity.queues,
            "Worker started"
        );

        while !*shutdown.borrow() {
            self.transition(WorkerState::Claiming);
            let job = match self
                .queue
                .claim(&self.identity.queues, self.claim_timeout)
                .await
            {
                Ok(Some(job)) => job,
                Ok(None) => {
                    self.transition(WorkerState::Idle);
                    continue;
                }
                Err(e) if !e.is_fatal() => {
                    warn!(worker = %self.identity.name, error = %e, "Discarding unreadable job");
                    self.transition(WorkerState::Idle);
                    continue;
                }
                Err(e) => {
                    error!(worker = %self.identity.name, error = %e, "Claim failed");
                    self.transition(WorkerState::Stopped);
                    return Err(e);
                }
            };

            if let Err(e) = self.process(job).await {
                error!(worker = %self.identity.name, error = %e, "Lost the queue while handling a job");
                self.transition(WorkerState::Stopped);
                return Err(e);
            }
            self.transition(WorkerState::Idle);
        }

        self.transition(WorkerState::Stopped);
        info!(worker = %self.identity.name, processed = self.processed, "Worker stopped");
        Ok(self.processed)
    }

    /// Execute one claimed job and publish its result
    pub async fn process(&mut self, job: QueuedJob) -> Result<JobResult, QueueError> {
        let job_id = job.job_id();
        info!(
            worker = %self.identity.name,
            job_id = %job_id,
            host = %job.request.target_host,
            kind = job.kind.route(),
            commands = job.request.commands.len(),
            "Claimed job"
        );
        // the job is already off the queue; it must still run and be reported
        if let Err(e) = self.queue.mark_running(&job, &self.identity.name).await {
            warn!(worker = %self.identity.name, job_id = %job_id, error = %e, "Could not mark job running");
        }

        self.transition(WorkerState::Executing);
        let result = match execute(self.connector.as_ref(), &job).await {
            Ok(output) => {
                info!(worker = %self.identity.name, job_id = %job_id, "Job succeeded");
                JobResult::success(job_id, job.kind, &self.identity.name, output)
            }
            Err(e) => {
                warn!(worker = %self.identity.name, job_id = %job_id, error = %e, "Job failed");
                JobResult::failure(job_id, job.kind, &self.identity.name, &e)
            }
        };

        self.transition(WorkerState::Reporting);
        self.queue.publish_result(&result).await?;
        self.processed += 1;
        Ok(result)
    }
}

/// Open a session for the job's device and drive it to completion.
///
/// The session is closed whether or not a step failed.
pub async fn execute(
    connector: &dyn DeviceConnector,
    job: &QueuedJob,
) -> Result<Vec<String>, ExecutionError> {
    let mut session = connector.connect(&DeviceTarget::from(&job.request)).await?;
    let outcome = drive(session.as_mut(), job).await;
    session.disconnect().await;
    outcome
}

/// Commands run strictly in submission order, then commit, then save
async fn drive(session: &mut dyn DeviceSession, job: &QueuedJob) -> Result<Vec<String>, ExecutionError> {
    let request = &job.request;
    let mut output = Vec::with_capacity(request.commands.len() + 2);

    match job.kind {
        JobKind::Command => {
            for command in &request.commands {
                output.push(session.send_command(command).await?);
            }
        }
        JobKind::Config => output.push(session.send_config(&request.commands).await?),
    }

    if request.commit {
        output.push(session.commit().await?);
    }
    if request.save_config {
        output.push(session.save_config().await?);
    }
    Ok(output)
}
