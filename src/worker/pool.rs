use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rand::Rng;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::job_worker::{JobWorker, WorkerIdentity};
use crate::config::PoolConfig;
use crate::device::DeviceConnector;
use crate::queue::{QueueBackend, QueueError};

const PROBE_BASE_DELAY: Duration = Duration::from_millis(500);
const PROBE_MAX_DELAY: Duration = Duration::from_secs(10);
const RESTART_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("queue backend {backend} not ready after {attempts} attempts: {source}")]
    BackendUnavailable {
        backend: String,
        attempts: u32,
        #[source]
        source: QueueError,
    },
}

/// Launches and supervises a fixed set of workers.
///
/// Each worker runs in its own task with its own queue connection; workers
/// share nothing but the (immutable) device connector. A worker whose task
/// fails is only relaunched when `restart` is configured.
pub struct WorkerPool {
    config: PoolConfig,
    backend: Arc<dyn QueueBackend>,
    connector: Arc<dyn DeviceConnector>,
}

impl WorkerPool {
    pub fn new(
        config: PoolConfig,
        backend: Arc<dyn QueueBackend>,
        connector: Arc<dyn DeviceConnector>,
    ) -> Self {
        Self {
            config,
            backend,
            connector,
        }
    }

    /// Worker identities, ordinals `1..=workers`
    pub fn identities(&self) -> Vec<WorkerIdentity> {
        (1..=self.config.workers)
            .map(|ordinal| {
                WorkerIdentity::new(&self.config.host_identity, ordinal, self.config.queues.clone())
            })
            .collect()
    }

    /// Wait out the startup delay, optionally probe the backend, then spawn
    /// every worker.
    pub async fn launch(self, shutdown: watch::Receiver<bool>) -> Result<PoolHandle, PoolError> {
        debug!(
            "Sleeping {:?} to allow the queue backend to initialize",
            self.config.startup_delay
        );
        sleep(self.config.startup_delay).await;

        if self.config.probe_attempts > 0 {
            self.wait_for_backend().await?;
        }

        info!("Creating {} workers", self.config.workers);
        let workers = self
            .identities()
            .into_iter()
            .map(|identity| {
                let name = identity.name.clone();
                let handle = tokio::spawn(supervise(
                    identity,
                    self.backend.clone(),
                    self.connector.clone(),
                    self.config.claim_timeout,
                    self.config.restart,
                    shutdown.clone(),
                ));
                (name, handle)
            })
            .collect();

        Ok(PoolHandle { workers })
    }

    /// PING with exponential backoff and jitter until the backend answers
    async fn wait_for_backend(&self) -> Result<(), PoolError> {
        let attempts = self.config.probe_attempts;
        let mut delay = PROBE_BASE_DELAY;
        let mut attempt = 1;

        loop {
            match probe(self.backend.as_ref()).await {
                Ok(()) => {
                    info!(attempt, backend = %self.backend.describe(), "Queue backend ready");
                    return Ok(());
                }
                Err(source) if attempt >= attempts => {
                    return Err(PoolError::BackendUnavailable {
                        backend: self.backend.describe(),
                        attempts,
                        source,
                    });
                }
                Err(e) => {
                    let jitter = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 2);
                    let wait = delay + Duration::from_millis(jitter);
                    warn!(attempt, error = %e, "Queue backend not ready, retrying in {:?}", wait);
                    sleep(wait).await;
                    delay = (delay * 2).min(PROBE_MAX_DELAY);
                    attempt += 1;
                }
            }
        }
    }
}

async fn probe(backend: &dyn QueueBackend) -> Result<(), QueueError> {
    backend.connect().await?.ping().await
}

/// How a supervised worker ended for good
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    /// Returned after a shutdown signal
    Stopped,
    /// Failed (or panicked) and was not relaunched
    Failed,
}

/// Run one worker, relaunching it after a failure when `restart` is set.
///
/// Each attempt is its own task so a panic is contained to that worker.
async fn supervise(
    identity: WorkerIdentity,
    backend: Arc<dyn QueueBackend>,
    connector: Arc<dyn DeviceConnector>,
    claim_timeout: Duration,
    restart: bool,
    shutdown: watch::Receiver<bool>,
) -> WorkerExit {
    loop {
        let attempt = tokio::spawn(run_worker(
            identity.clone(),
            backend.clone(),
            connector.clone(),
            claim_timeout,
            shutdown.clone(),
        ));

        match attempt.await {
            Ok(Ok(_)) => return WorkerExit::Stopped,
            Ok(Err(e)) => error!(worker = %identity.name, error = %e, "Worker failed"),
            Err(e) if e.is_panic() => error!(worker = %identity.name, "Worker panicked"),
            Err(e) => {
                error!(worker = %identity.name, error = %e, "Worker task cancelled");
                return WorkerExit::Failed;
            }
        }

        if !restart || *shutdown.borrow() {
            return WorkerExit::Failed;
        }
        warn!(worker = %identity.name, "Restarting worker in {:?}", RESTART_DELAY);
        sleep(RESTART_DELAY).await;
    }
}

async fn run_worker(
    identity: WorkerIdentity,
    backend: Arc<dyn QueueBackend>,
    connector: Arc<dyn DeviceConnector>,
    claim_timeout: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<u64, QueueError> {
    debug!(worker = %identity.name, "Initializing queue connection to {}", backend.describe());
    let queue = backend.connect().await?;

    debug!(
        "Starting worker {}, with connection to {}, to watch the following queue(s): {:?}",
        identity.name,
        backend.describe(),
        identity.queues
    );
    JobWorker::new(identity, queue, connector, claim_timeout)
        .run(shutdown)
        .await
}

/// Handles of a launched pool
pub struct PoolHandle {
    workers: Vec<(String, JoinHandle<WorkerExit>)>,
}

impl PoolHandle {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to end; returns how many stopped cleanly on
    /// shutdown rather than failing
    pub async fn wait(self) -> usize {
        let (names, handles): (Vec<_>, Vec<_>) = self.workers.into_iter().unzip();
        let mut stopped = 0;
        for (name, outcome) in names.iter().zip(join_all(handles).await) {
            match outcome {
                Ok(WorkerExit::Stopped) => stopped += 1,
                Ok(WorkerExit::Failed) => {}
                Err(e) => error!(worker = %name, error = %e, "Worker supervisor failed"),
            }
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::job::models::{JobKind, JobRequest, JobStatus, QueuedJob};
    use crate::device::fake::FakeConnector;
    use crate::queue::memory::MemoryBackend;
    use crate::queue::JobQueue;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn config(workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            queues: vec!["naas".to_string()],
            host_identity: "edge01".to_string(),
            startup_delay: Duration::ZERO,
            probe_attempts: 0,
            restart: false,
            claim_timeout: Duration::from_millis(20),
        }
    }

    fn job(host: &str) -> QueuedJob {
        QueuedJob::new(
            JobKind::Command,
            JobRequest {
                job_id: Uuid::new_v4(),
                target_host: host.to_string(),
                port: 22,
                device_type: "cisco_ios".to_string(),
                commands: vec!["show version".to_string()],
                save_config: false,
                commit: false,
            },
        )
    }

    async fn wait_for_results(backend: &MemoryBackend, count: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while backend.published().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("results were not published in time");
    }

    #[test]
    fn identities_are_unique_and_ordered() {
        let pool = WorkerPool::new(
            config(3),
            Arc::new(MemoryBackend::new()),
            Arc::new(FakeConnector::default()),
        );
        let names: Vec<String> = pool.identities().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["edge01_1", "edge01_2", "edge01_3"]);
    }

    #[tokio::test]
    async fn two_jobs_three_workers_each_job_runs_once() {
        let backend = MemoryBackend::new();
        let connector = FakeConnector::with_delay(Duration::from_millis(100));
        let queue = backend.queue();
        let first = job("10.0.0.1");
        let second = job("10.0.0.2");
        queue.enqueue("naas", &first).await.unwrap();
        queue.enqueue("naas", &second).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = WorkerPool::new(config(3), Arc::new(backend.clone()), Arc::new(connector.clone()))
            .launch(shutdown_rx)
            .await
            .unwrap();
        assert_eq!(pool.len(), 3);

        wait_for_results(&backend, 2).await;
        // give an idle worker the chance to (wrongly) pick something up
        tokio::time::sleep(Duration::from_millis(150)).await;
        shutdown_tx.send(true).unwrap();
        assert_eq!(pool.wait().await, 3);

        let results = backend.published();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == JobStatus::Success));

        let jobs: HashSet<Uuid> = results.iter().map(|r| r.job_id).collect();
        assert_eq!(jobs, HashSet::from([first.job_id(), second.job_id()]));

        let workers: HashSet<&str> = results.iter().map(|r| r.worker.as_str()).collect();
        assert_eq!(workers.len(), 2);

        assert_eq!(connector.sent().len(), 2);
        assert_eq!(backend.connections(), 3);
        assert_eq!(backend.pending("naas"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn launch_waits_for_the_startup_delay() {
        let backend = MemoryBackend::new();
        let mut config = config(1);
        config.startup_delay = Duration::from_secs(10);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let started = tokio::time::Instant::now();
        let pool = WorkerPool::new(config, Arc::new(backend.clone()), Arc::new(FakeConnector::default()))
            .launch(shutdown_rx)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(10));
        shutdown_tx.send(true).unwrap();
        pool.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn probe_gives_up_after_configured_attempts() {
        let backend = MemoryBackend::new();
        backend.set_available(false);
        let mut config = config(2);
        config.probe_attempts = 3;

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let err = WorkerPool::new(config, Arc::new(backend.clone()), Arc::new(FakeConnector::default()))
            .launch(shutdown_rx)
            .await
            .err()
            .unwrap();

        match err {
            PoolError::BackendUnavailable { attempts, .. } => assert_eq!(attempts, 3),
        }
        assert_eq!(backend.connections(), 0);
    }

    #[tokio::test]
    async fn worker_without_backend_does_not_launch() {
        let backend = MemoryBackend::new();
        backend.set_available(false);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = WorkerPool::new(config(2), Arc::new(backend.clone()), Arc::new(FakeConnector::default()))
            .launch(shutdown_rx)
            .await
            .unwrap();

        // both supervisors give up because restart is off
        assert_eq!(pool.wait().await, 0);
        assert_eq!(backend.connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_relaunches_a_failed_worker() {
        let backend = MemoryBackend::new();
        let mut config = config(1);
        config.restart = true;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = WorkerPool::new(config, Arc::new(backend.clone()), Arc::new(FakeConnector::default()))
            .launch(shutdown_rx)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        backend.set_available(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        backend.set_available(true);
        tokio::time::sleep(RESTART_DELAY * 2).await;

        let queued = job("10.0.0.9");
        backend.queue().enqueue("naas", &queued).await.unwrap();
        wait_for_results(&backend, 1).await;

        assert_eq!(backend.published()[0].job_id, queued.job_id());
        assert!(backend.connections() >= 2);

        shutdown_tx.send(true).unwrap();
        pool.wait().await;
    }
}
