//! Remote execution against network devices.
//!
//! The worker only talks to the [`DeviceConnector`] / [`DeviceSession`]
//! traits. A session is opened per job and driven serially: device CLIs
//! cannot interleave commands.
//!
//! - [`SshConnector`]: shells out to the system `ssh` client
//! - [`Dialect`]: per device type config-mode, commit and save commands

pub mod dialect;
#[cfg(test)]
pub mod fake;
pub mod ssh;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::job::models::JobRequest;

pub use dialect::Dialect;
pub use ssh::SshConnector;

/// Category of a failed job, used as the prefix of the published error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connection,
    Authentication,
    Command,
    Commit,
    Save,
    Unsupported,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Connection => write!(f, "connection"),
            FailureKind::Authentication => write!(f, "authentication"),
            FailureKind::Command => write!(f, "command"),
            FailureKind::Commit => write!(f, "commit"),
            FailureKind::Save => write!(f, "save"),
            FailureKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: FailureKind,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Connection, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unsupported, message)
    }
}

/// Where and how to reach a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub host: String,
    pub port: u16,
    pub device_type: String,
}

impl From<&JobRequest> for DeviceTarget {
    fn from(request: &JobRequest) -> Self {
        Self {
            host: request.target_host.clone(),
            port: request.port,
            device_type: request.device_type.clone(),
        }
    }
}

#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn DeviceSession>, ExecutionError>;
}

/// One open session with a device. Timeouts are the implementation's concern.
#[async_trait]
pub trait DeviceSession: Send {
    /// Run a single exec-mode command and return its output
    async fn send_command(&mut self, command: &str) -> Result<String, ExecutionError>;

    /// Apply a block of configuration lines inside configuration mode
    async fn send_config(&mut self, commands: &[String]) -> Result<String, ExecutionError>;

    async fn commit(&mut self) -> Result<String, ExecutionError>;

    async fn save_config(&mut self) -> Result<String, ExecutionError>;

    async fn disconnect(&mut self) {}
}
