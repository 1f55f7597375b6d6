//! Admission checks for inbound job payloads.
//!
//! Each check either returns the normalized value for its field or a
//! [`ValidationError`] carrying one of two categories:
//! - `BadRequest` (400) for structural and primitive type errors
//! - `UnprocessableEntity` (422) for well-formed input that breaks a job rule
//!
//! Every rejection is logged once at error level, with the field name when
//! known, before it is returned to the caller.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::error;
use uuid::{Uuid, Version};
use validator::ValidateIp;

use crate::api::job::models::{JobRequest, RawJobRequest, DEFAULT_DEVICE_TYPE, DEFAULT_PORT};

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub fields: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    BadRequest,
    UnprocessableEntity,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::BadRequest => StatusCode::BAD_REQUEST,
            Rejection::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

/// A rejected admission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub rejection: Rejection,
    pub field: Option<String>,
    pub message: String,
}

impl ResponseError for ValidationError {
    fn status_code(&self) -> StatusCode {
        self.rejection.status()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Validation failed")
                .to_string(),
            fields: serde_json::json!({
                "field": self.field,
                "message": self.message,
            }),
        })
    }
}

/// Per-call context for a validation run.
///
/// Holds nothing but what is needed to label a rejection in the logs.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    route: &'a str,
}

impl<'a> ValidationContext<'a> {
    pub fn new(route: &'a str) -> Self {
        Self { route }
    }

    fn reject(
        &self,
        rejection: Rejection,
        field: Option<&str>,
        message: impl Into<String>,
    ) -> ValidationError {
        let message = message.into();
        error!(
            route = self.route,
            field = field.unwrap_or("-"),
            status = rejection.status().as_u16(),
            "{}",
            message
        );
        ValidationError {
            rejection,
            field: field.map(str::to_string),
            message,
        }
    }
}

/// The body must be a non-empty JSON object
pub fn require_json(body: &[u8], ctx: &ValidationContext) -> Result<RawJobRequest, ValidationError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ctx.reject(Rejection::BadRequest, None, "json required"))?;

    match value {
        Value::Object(map) if !map.is_empty() => serde_json::from_value(Value::Object(map))
            .map_err(|e| ctx.reject(Rejection::BadRequest, None, format!("malformed payload: {}", e))),
        _ => Err(ctx.reject(Rejection::BadRequest, None, "json required")),
    }
}

pub fn require_not_none<'v>(
    value: Option<&'v Value>,
    field: &str,
    ctx: &ValidationContext,
) -> Result<&'v Value, ValidationError> {
    value.ok_or_else(|| ctx.reject(Rejection::BadRequest, Some(field), "value cannot be null"))
}

/// Accepts IPv4 or IPv6 literals only; hostnames are rejected
pub fn validate_ip(
    value: Option<&Value>,
    field: &str,
    ctx: &ValidationContext,
) -> Result<String, ValidationError> {
    let value = require_not_none(value, field, ctx)?;
    match value.as_str() {
        Some(ip) if ip.validate_ip() => Ok(ip.to_string()),
        _ => Err(ctx.reject(Rejection::BadRequest, Some(field), "invalid IP Address")),
    }
}

/// Accepts any textual form `Uuid::parse_str` reads (hyphenated, simple,
/// braced, `urn:uuid:`) as long as the UUID is version 4
pub fn validate_uuid(value: &str, ctx: &ValidationContext) -> Result<Uuid, ValidationError> {
    match Uuid::parse_str(value) {
        Ok(id) if id.get_version() == Some(Version::Random) => Ok(id),
        _ => Err(ctx.reject(Rejection::BadRequest, Some("job_id"), "invalid UUID")),
    }
}

/// Port defaults to 22. A supplied port must be an integer in 1..=65535.
pub fn default_port(value: Option<&Value>, ctx: &ValidationContext) -> Result<u16, ValidationError> {
    let Some(value) = value else {
        return Ok(DEFAULT_PORT);
    };

    value
        .as_u64()
        .and_then(|port| u16::try_from(port).ok())
        .filter(|port| *port != 0)
        .ok_or_else(|| {
            ctx.reject(
                Rejection::BadRequest,
                Some("port"),
                "port must be an Integer between 1 and 65535",
            )
        })
}

fn default_flag(
    value: Option<&Value>,
    field: &str,
    ctx: &ValidationContext,
) -> Result<bool, ValidationError> {
    match value {
        None => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(_) => Err(ctx.reject(
            Rejection::BadRequest,
            Some(field),
            format!("{} must be a Boolean", field),
        )),
    }
}

pub fn default_save_config(value: Option<&Value>, ctx: &ValidationContext) -> Result<bool, ValidationError> {
    default_flag(value, "save_config", ctx)
}

pub fn default_commit(value: Option<&Value>, ctx: &ValidationContext) -> Result<bool, ValidationError> {
    default_flag(value, "commit", ctx)
}

/// Commands must be a non-empty list of strings
pub fn require_commands(
    value: Option<&Value>,
    ctx: &ValidationContext,
) -> Result<Vec<String>, ValidationError> {
    let reject = |message: &str| ctx.reject(Rejection::UnprocessableEntity, Some("commands"), message);

    let items = match value {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(reject("please provide commands in a list")),
    };

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| reject("commands must be strings"))
        })
        .collect()
}

/// A missing or empty device type falls back to the baseline driver
pub fn default_device_type(
    value: Option<&Value>,
    ctx: &ValidationContext,
) -> Result<String, ValidationError> {
    match value {
        None => Ok(DEFAULT_DEVICE_TYPE.to_string()),
        Some(Value::String(s)) if s.is_empty() => Ok(DEFAULT_DEVICE_TYPE.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ctx.reject(
            Rejection::UnprocessableEntity,
            Some("device_type"),
            "device_type must be a string",
        )),
    }
}

/// Run every check in admission order and build the normalized request.
///
/// The first failing check aborts the whole request. A missing `job_id` is
/// assigned here.
pub fn normalize(raw: &RawJobRequest, ctx: &ValidationContext) -> Result<JobRequest, ValidationError> {
    let job_id = match raw.job_id.as_ref() {
        None => Uuid::new_v4(),
        Some(Value::String(id)) => validate_uuid(id, ctx)?,
        Some(_) => return Err(ctx.reject(Rejection::BadRequest, Some("job_id"), "invalid UUID")),
    };

    let target_host = validate_ip(raw.target_host.as_ref(), "target_host", ctx)?;
    let port = default_port(raw.port.as_ref(), ctx)?;
    let device_type = default_device_type(raw.device_type.as_ref(), ctx)?;
    let commands = require_commands(raw.commands.as_ref(), ctx)?;
    let save_config = default_save_config(raw.save_config.as_ref(), ctx)?;
    let commit = default_commit(raw.commit.as_ref(), ctx)?;

    Ok(JobRequest {
        job_id,
        target_host,
        port,
        device_type,
        commands,
        save_config,
        commit,
    })
}
