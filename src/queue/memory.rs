//! In-process queue backend for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{JobQueue, JobState, QueueBackend, QueueError};
use crate::api::job::models::{JobResult, QueuedJob};

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<QueuedJob>>,
    markers: HashMap<Uuid, JobState>,
    published: Vec<JobResult>,
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
    available: AtomicBool,
    markers_fail: AtomicBool,
    connections: AtomicUsize,
}

/// All connections opened from one backend share the same queues
#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                available: AtomicBool::new(true),
                markers_fail: AtomicBool::new(false),
                connections: AtomicUsize::new(0),
            }),
        }
    }

    /// Simulate the server going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Make `mark_running` fail while everything else keeps working
    pub fn fail_markers(&self, fail: bool) {
        self.shared.markers_fail.store(fail, Ordering::SeqCst);
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Every result ever published, in publish order
    pub fn published(&self) -> Vec<JobResult> {
        self.shared.state.lock().unwrap().published.clone()
    }

    pub fn pending(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .unwrap()
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    pub fn queue(&self) -> MemoryQueue {
        MemoryQueue {
            shared: self.shared.clone(),
        }
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn connect(&self) -> Result<Box<dyn JobQueue>, QueueError> {
        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("memory backend offline".to_string()));
        }
        self.shared.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.queue()))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    fn check(&self) -> Result<(), QueueError> {
        if self.shared.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Unavailable("memory backend offline".to_string()))
        }
    }

    fn pop(&self, queues: &[String]) -> Option<QueuedJob> {
        let mut state = self.shared.state.lock().unwrap();
        queues
            .iter()
            .find_map(|name| state.queues.get_mut(name).and_then(VecDeque::pop_front))
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, queue: &str, job: &QueuedJob) -> Result<(), QueueError> {
        self.check()?;
        {
            let mut state = self.shared.state.lock().unwrap();
            state.markers.insert(job.job_id(), JobState::Queued { kind: job.kind });
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(job.clone());
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn claim(&self, queues: &[String], timeout: Duration) -> Result<Option<QueuedJob>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.check()?;
            // registered before the pop so an enqueue in between still wakes us
            let notified = self.shared.notify.notified();
            if let Some(job) = self.pop(queues) {
                return Ok(Some(job));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn mark_running(&self, job: &QueuedJob, worker: &str) -> Result<(), QueueError> {
        self.check()?;
        if self.shared.markers_fail.load(Ordering::SeqCst) {
            return Err(QueueError::Command("READONLY marker write refused".to_string()));
        }
        self.shared.state.lock().unwrap().markers.insert(
            job.job_id(),
            JobState::Running {
                kind: job.kind,
                worker: worker.to_string(),
            },
        );
        Ok(())
    }

    async fn publish_result(&self, result: &JobResult) -> Result<(), QueueError> {
        self.check()?;
        let mut state = self.shared.state.lock().unwrap();
        state
            .markers
            .insert(result.job_id, JobState::Finished(result.clone()));
        state.published.push(result.clone());
        Ok(())
    }

    async fn lookup(&self, job_id: Uuid) -> Result<JobState, QueueError> {
        self.check()?;
        Ok(self
            .shared
            .state
            .lock()
            .unwrap()
            .markers
            .get(&job_id)
            .cloned()
            .unwrap_or(JobState::Unknown))
    }

    async fn ping(&self) -> Result<(), QueueError> {
        self.check()
    }
}
