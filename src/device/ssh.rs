use std::io;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::{DeviceConnector, DeviceSession, DeviceTarget, Dialect, ExecutionError, FailureKind};
use crate::config::SshConfig;

/// `ssh` reserves this exit status for its own failures
const SSH_ERROR_STATUS: i32 = 255;

/// Opens sessions by invoking the system `ssh` client in batch mode.
///
/// Authentication is key based (agent or `identity`); password prompts are
/// disabled so a bad credential fails fast instead of hanging the worker.
#[derive(Debug, Clone)]
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DeviceConnector for SshConnector {
    async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn DeviceSession>, ExecutionError> {
        let dialect = Dialect::for_device_type(&target.device_type);
        debug!(
            host = %target.host,
            port = target.port,
            device_type = %target.device_type,
            dialect = dialect.name,
            "Opening ssh session"
        );

        Ok(Box::new(SshSession {
            target: target.clone(),
            dialect,
            config: self.config.clone(),
        }))
    }
}

struct SshSession {
    target: DeviceTarget,
    dialect: Dialect,
    config: SshConfig,
}

impl SshSession {
    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-T".to_string(),
            "-p".to_string(),
            self.target.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout),
        ];

        if let Some(ref identity) = self.config.identity {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        if let Some(ref user) = self.config.user {
            args.push("-l".to_string());
            args.push(user.clone());
        }

        args.push(self.target.host.clone());
        args
    }

    /// Run either a single remote command or a script fed through stdin
    async fn run(
        &self,
        remote: Option<&str>,
        script: Option<String>,
        failure: FailureKind,
    ) -> Result<String, ExecutionError> {
        let mut command = Command::new(&self.config.program);
        command
            .args(self.base_args())
            .stdin(if script.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(remote) = remote {
            command.arg("--").arg(remote);
        }

        let child = command.spawn().map_err(|e| {
            ExecutionError::connection(format!("failed to launch {}: {}", self.config.program, e))
        })?;

        let (output, fed) = converse(child, script)
            .await
            .map_err(|e| ExecutionError::connection(e.to_string()))?;

        // a device that hung up mid-script and still exited 0 did not take the config
        if let Err(e) = fed {
            if output.status.success() {
                return Err(ExecutionError::connection(format!("session closed early: {}", e)));
            }
        }

        classify(output, failure)
    }
}

#[async_trait]
impl DeviceSession for SshSession {
    async fn send_command(&mut self, command: &str) -> Result<String, ExecutionError> {
        info!(host = %self.target.host, command, "Sending command");
        self.run(Some(command), None, FailureKind::Command).await
    }

    async fn send_config(&mut self, commands: &[String]) -> Result<String, ExecutionError> {
        info!(host = %self.target.host, lines = commands.len(), "Sending config set");
        let script = self.dialect.config_script(commands);
        self.run(None, Some(script), FailureKind::Command).await
    }

    async fn commit(&mut self) -> Result<String, ExecutionError> {
        let script = self.dialect.commit_script().ok_or_else(|| {
            ExecutionError::unsupported(format!("{} has no commit operation", self.target.device_type))
        })?;
        self.run(None, Some(script), FailureKind::Commit).await
    }

    async fn save_config(&mut self) -> Result<String, ExecutionError> {
        let save = self.dialect.save.ok_or_else(|| {
            ExecutionError::unsupported(format!("{} has no save operation", self.target.device_type))
        })?;
        self.run(Some(save), None, FailureKind::Save).await
    }
}

/// Feed `script` to the child's stdin while its stdout and stderr are drained.
///
/// Stdin is closed once the script is written. A device echoing its input
/// must never see a full pipe on either side.
async fn converse(mut child: Child, script: Option<String>) -> io::Result<(Output, io::Result<()>)> {
    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(mut stdin), Some(script)) = (stdin, script) {
            stdin.write_all(script.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        Ok::<(), io::Error>(())
    };

    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    Ok((output?, fed))
}

/// Turn a finished `ssh` process into command output or a categorized error
fn classify(output: Output, failure: FailureKind) -> Result<String, ExecutionError> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let code = output.status.code();

    match code {
        Some(0) => Ok(stdout),
        Some(SSH_ERROR_STATUS) if stderr.contains("Permission denied") => {
            Err(ExecutionError::new(FailureKind::Authentication, stderr))
        }
        Some(SSH_ERROR_STATUS) => Err(ExecutionError::connection(if stderr.is_empty() {
            "ssh exited with status 255".to_string()
        } else {
            stderr
        })),
        _ => Err(ExecutionError::new(
            failure,
            if stderr.is_empty() {
                format!("exit code: {:?}", code)
            } else {
                stderr
            },
        )),
    }
}
