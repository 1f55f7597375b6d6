use serde::Serialize;
use uuid::Uuid;

/// Response for an admitted job
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub queue: String,
    pub message: String,
}

/// Response for a job that has not produced a result yet
#[derive(Debug, Serialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}
