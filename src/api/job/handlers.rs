use actix_web::{
    get, post,
    web::{Bytes, Data, Path, ServiceConfig},
    HttpResponse,
};

use super::dto::JobProgress;
use super::models::JobKind;
use super::service::{JobService, ServiceError};
use crate::queue::JobState;

#[post("/send_command")]
async fn send_command(service: Data<JobService>, body: Bytes) -> Result<HttpResponse, ServiceError> {
    let accepted = service.admit(JobKind::Command, &body).await?;
    Ok(HttpResponse::Accepted().json(accepted))
}

#[post("/send_config")]
async fn send_config(service: Data<JobService>, body: Bytes) -> Result<HttpResponse, ServiceError> {
    let accepted = service.admit(JobKind::Config, &body).await?;
    Ok(HttpResponse::Accepted().json(accepted))
}

#[get("/send_command/{job_id}")]
async fn command_result(service: Data<JobService>, job_id: Path<String>) -> Result<HttpResponse, ServiceError> {
    respond(&service, JobKind::Command, &job_id).await
}

#[get("/send_config/{job_id}")]
async fn config_result(service: Data<JobService>, job_id: Path<String>) -> Result<HttpResponse, ServiceError> {
    respond(&service, JobKind::Config, &job_id).await
}

async fn respond(service: &JobService, kind: JobKind, job_id: &str) -> Result<HttpResponse, ServiceError> {
    let (job_id, state) = service.lookup(kind, job_id).await?;
    let response = match state {
        JobState::Finished(result) => HttpResponse::Ok().json(result),
        JobState::Running { worker, .. } => HttpResponse::Accepted().json(JobProgress {
            job_id,
            status: "running",
            worker: Some(worker),
        }),
        // lookup never hands back Unknown
        JobState::Queued { .. } | JobState::Unknown => HttpResponse::Accepted().json(JobProgress {
            job_id,
            status: "queued",
            worker: None,
        }),
    };
    Ok(response)
}

pub fn job_config(config: &mut ServiceConfig) {
    config
        .service(send_command)
        .service(send_config)
        .service(command_result)
        .service(config_result);
}
