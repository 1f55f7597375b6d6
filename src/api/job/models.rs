use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::device::ExecutionError;

/// Port used when a request does not name one
pub const DEFAULT_PORT: u16 = 22;

/// Driver used when a request does not name a device type
pub const DEFAULT_DEVICE_TYPE: &str = "cisco_ios";

/// Which endpoint admitted a job.
///
/// `Command` jobs run each command in exec mode; `Config` jobs send the
/// whole command list inside the dialect's configuration mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Command,
    Config,
}

impl JobKind {
    pub fn route(&self) -> &'static str {
        match self {
            JobKind::Command => "send_command",
            JobKind::Config => "send_config",
        }
    }
}

/// Job payload exactly as submitted.
///
/// Fields are held as raw JSON so a wrongly typed value reaches the
/// validator (and gets a categorized rejection) instead of failing
/// deserialization. A JSON `null` is treated the same as an absent field.
#[derive(Debug, Default, Deserialize)]
pub struct RawJobRequest {
    #[serde(default)]
    pub job_id: Option<Value>,
    #[serde(default, alias = "ip")]
    pub target_host: Option<Value>,
    #[serde(default)]
    pub port: Option<Value>,
    #[serde(default)]
    pub device_type: Option<Value>,
    #[serde(default)]
    pub commands: Option<Value>,
    #[serde(default)]
    pub save_config: Option<Value>,
    #[serde(default)]
    pub commit: Option<Value>,
}

/// A fully populated, type-checked job request.
///
/// Only the validator builds these; nothing downstream re-checks the fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: Uuid,
    pub target_host: String,
    pub port: u16,
    pub device_type: String,
    pub commands: Vec<String>,
    pub save_config: bool,
    pub commit: bool,
}

/// What actually travels through the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub kind: JobKind,
    #[serde(flatten)]
    pub request: JobRequest,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(kind: JobKind, request: JobRequest) -> Self {
        Self {
            kind,
            request,
            enqueued_at: Utc::now(),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.request.job_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failure,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Outcome of one admitted job, produced once by the worker that claimed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub output: Option<Vec<String>>,
    pub error: Option<String>,
    pub worker: String,
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    pub fn success(job_id: Uuid, kind: JobKind, worker: &str, output: Vec<String>) -> Self {
        Self {
            job_id,
            kind,
            status: JobStatus::Success,
            output: Some(output),
            error: None,
            worker: worker.to_string(),
            completed_at: Utc::now(),
        }
    }

    pub fn failure(job_id: Uuid, kind: JobKind, worker: &str, error: &ExecutionError) -> Self {
        Self {
            job_id,
            kind,
            status: JobStatus::Failure,
            output: None,
            error: Some(error.to_string()),
            worker: worker.to_string(),
            completed_at: Utc::now(),
        }
    }
}
