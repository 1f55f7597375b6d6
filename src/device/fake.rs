//! Scripted device connector for tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{DeviceConnector, DeviceSession, DeviceTarget, ExecutionError, FailureKind};

/// Records every line sent to any device, in order
#[derive(Clone, Default)]
pub struct FakeConnector {
    /// A command that the device rejects
    fail_on: Option<String>,
    /// A host that refuses connections
    unreachable: Option<String>,
    /// Time each command takes
    delay: Duration,
    sent: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn failing_on(command: &str) -> Self {
        Self {
            fail_on: Some(command.to_string()),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn refusing(host: &str) -> Self {
        Self {
            unreachable: Some(host.to_string()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceConnector for FakeConnector {
    async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn DeviceSession>, ExecutionError> {
        if self.unreachable.as_deref() == Some(target.host.as_str()) {
            return Err(ExecutionError::connection(format!("{}:{} timed out", target.host, target.port)));
        }
        Ok(Box::new(FakeSession {
            connector: self.clone(),
        }))
    }
}

struct FakeSession {
    connector: FakeConnector,
}

impl FakeSession {
    fn record(&self, line: &str) {
        self.connector.sent.lock().unwrap().push(line.to_string());
    }
}

#[async_trait]
impl DeviceSession for FakeSession {
    async fn send_command(&mut self, command: &str) -> Result<String, ExecutionError> {
        tokio::time::sleep(self.connector.delay).await;
        self.record(command);
        if self.connector.fail_on.as_deref() == Some(command) {
            return Err(ExecutionError::new(FailureKind::Command, format!("% Invalid input: {}", command)));
        }
        Ok(format!("output of {}", command))
    }

    async fn send_config(&mut self, commands: &[String]) -> Result<String, ExecutionError> {
        tokio::time::sleep(self.connector.delay).await;
        for command in commands {
            self.record(command);
        }
        Ok(format!("applied {} lines", commands.len()))
    }

    async fn commit(&mut self) -> Result<String, ExecutionError> {
        self.record("<commit>");
        Ok("commit complete".to_string())
    }

    async fn save_config(&mut self) -> Result<String, ExecutionError> {
        self.record("<save>");
        Ok("[OK]".to_string())
    }
}
