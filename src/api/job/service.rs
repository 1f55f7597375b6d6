use std::sync::Arc;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::dto::JobAccepted;
use super::models::{JobKind, QueuedJob};
use crate::api::validation::{self, ErrorResponse, ValidationContext, ValidationError};
use crate::queue::{JobQueue, JobState, QueueError};

/// Service-level errors
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Admission rejected the payload
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Queue backend failed
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// No job with this id is known to the queue
    #[error("Job not found: {0}")]
    NotFound(Uuid),
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(e) => e.status_code(),
            ServiceError::Queue(QueueError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            // already logged by the validator
            ServiceError::Validation(e) => e.error_response(),
            ServiceError::Queue(e) => {
                error!("Queue error: {}", e);
                HttpResponse::build(self.status_code()).json(ErrorResponse {
                    error: "Failed to process request".to_string(),
                    fields: serde_json::json!({"message": "Queue backend error occurred"}),
                })
            }
            ServiceError::NotFound(id) => {
                warn!("Job not found: {}", id);
                HttpResponse::NotFound().json(ErrorResponse {
                    error: "Not found".to_string(),
                    fields: serde_json::json!({"message": format!("Job with id {} not found", id)}),
                })
            }
        }
    }
}

/// Admission boundary: validates payloads and hands accepted jobs to the queue
pub struct JobService {
    queue: Arc<dyn JobQueue>,
    queue_name: String,
}

impl JobService {
    pub fn new(queue: Arc<dyn JobQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
        }
    }

    /// Validate a raw request body and enqueue it
    ///
    /// # Business Logic
    /// - Runs every admission check; the first failure rejects the request
    /// - Nothing is enqueued for a rejected request
    /// - Assigns a job id when the caller did not supply one
    pub async fn admit(&self, kind: JobKind, body: &[u8]) -> Result<JobAccepted, ServiceError> {
        let ctx = ValidationContext::new(kind.route());
        let raw = validation::require_json(body, &ctx)?;
        let request = validation::normalize(&raw, &ctx)?;

        let job = QueuedJob::new(kind, request);
        self.queue.enqueue(&self.queue_name, &job).await?;

        info!(
            job_id = %job.job_id(),
            host = %job.request.target_host,
            device_type = %job.request.device_type,
            commands = job.request.commands.len(),
            queue = %self.queue_name,
            "Service: Job admitted"
        );

        Ok(JobAccepted {
            job_id: job.job_id(),
            queue: self.queue_name.clone(),
            message: "Job enqueued".to_string(),
        })
    }

    /// Current state of a job; the id goes through the same UUID check as admission.
    ///
    /// A job is only visible through the endpoint that admitted it.
    pub async fn lookup(&self, kind: JobKind, job_id: &str) -> Result<(Uuid, JobState), ServiceError> {
        let ctx = ValidationContext::new(kind.route());
        let id = validation::validate_uuid(job_id, &ctx)?;

        match self.queue.lookup(id).await? {
            state if state.kind() == Some(kind) => Ok((id, state)),
            _ => Err(ServiceError::NotFound(id)),
        }
    }

    pub async fn ping(&self) -> Result<(), QueueError> {
        self.queue.ping().await
    }
}
