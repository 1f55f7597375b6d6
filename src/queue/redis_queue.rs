use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{JobQueue, JobState, QueueBackend, QueueError};
use crate::api::job::models::{JobKind, JobResult, QueuedJob};
use crate::config::BackendConfig;

const KEY_PREFIX: &str = "naas";

fn queue_key(queue: &str) -> String {
    format!("{}:queue:{}", KEY_PREFIX, queue)
}

fn job_key(job_id: Uuid) -> String {
    format!("{}:job:{}", KEY_PREFIX, job_id)
}

fn result_key(job_id: Uuid) -> String {
    format!("{}:result:{}", KEY_PREFIX, job_id)
}

/// Value stored under the job key until a result exists
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
enum Marker {
    Queued { kind: JobKind },
    Running { kind: JobKind, worker: String },
}

impl From<Marker> for JobState {
    fn from(marker: Marker) -> Self {
        match marker {
            Marker::Queued { kind } => JobState::Queued { kind },
            Marker::Running { kind, worker } => JobState::Running { kind, worker },
        }
    }
}

impl From<RedisError> for QueueError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            QueueError::Unavailable(err.to_string())
        } else {
            QueueError::Command(err.to_string())
        }
    }
}

/// Opens Redis connections.
///
/// Jobs are Redis lists (`LPUSH` to enqueue, `BRPOP` to claim), so claim
/// exclusivity comes from the server.
pub struct RedisBackend {
    client: Client,
    config: BackendConfig,
}

impl RedisBackend {
    /// Only validates the parameters; no connection is made until [`QueueBackend::connect`]
    pub fn new(config: BackendConfig) -> Result<Self, QueueError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = Client::open(info)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    async fn connect(&self) -> Result<Box<dyn JobQueue>, QueueError> {
        debug!("Initializing Redis connection to {}", self.config.address());
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(Box::new(RedisQueue {
            conn,
            result_ttl: self.config.result_ttl,
        }))
    }

    fn describe(&self) -> String {
        self.config.address()
    }
}

pub struct RedisQueue {
    conn: MultiplexedConnection,
    result_ttl: u64,
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, queue: &str, job: &QueuedJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let marker = serde_json::to_string(&Marker::Queued { kind: job.kind })?;
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .set_ex(job_key(job.job_id()), marker, self.result_ttl)
            .ignore()
            .lpush(queue_key(queue), payload)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn claim(&self, queues: &[String], timeout: Duration) -> Result<Option<QueuedJob>, QueueError> {
        let keys: Vec<String> = queues.iter().map(|q| queue_key(q)).collect();
        // BRPOP treats 0 as "block forever"
        let seconds = timeout.as_secs().max(1);
        let mut conn = self.conn.clone();

        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&keys)
            .arg(seconds)
            .query_async(&mut conn)
            .await?;

        match popped {
            None => Ok(None),
            Some((key, payload)) => {
                debug!(queue = %key, "Claimed job payload");
                Ok(Some(serde_json::from_str(&payload)?))
            }
        }
    }

    async fn mark_running(&self, job: &QueuedJob, worker: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let marker = serde_json::to_string(&Marker::Running {
            kind: job.kind,
            worker: worker.to_string(),
        })?;
        let _: () = conn.set_ex(job_key(job.job_id()), marker, self.result_ttl).await?;
        Ok(())
    }

    async fn publish_result(&self, result: &JobResult) -> Result<(), QueueError> {
        let payload = serde_json::to_string(result)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(result_key(result.job_id), payload, self.result_ttl)
            .await?;
        Ok(())
    }

    async fn lookup(&self, job_id: Uuid) -> Result<JobState, QueueError> {
        let mut conn = self.conn.clone();

        let result: Option<String> = conn.get(result_key(job_id)).await?;
        if let Some(raw) = result {
            return Ok(JobState::Finished(serde_json::from_str(&raw)?));
        }

        let marker: Option<String> = conn.get(job_key(job_id)).await?;
        parse_marker(marker.as_deref())
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn parse_marker(marker: Option<&str>) -> Result<JobState, QueueError> {
    match marker {
        None => Ok(JobState::Unknown),
        Some(raw) => Ok(serde_json::from_str::<Marker>(raw)?.into()),
    }
}
