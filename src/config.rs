use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Connection parameters for the Redis queue backend
#[derive(Clone)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,

    /// How long queued markers and published results are kept (seconds)
    pub result_ttl: u64,
}

impl BackendConfig {
    /// Printable address, never includes the credential
    pub fn address(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("result_ttl", &self.result_ttl)
            .finish()
    }
}

/// Admission API settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address the HTTP server binds to, e.g. `0.0.0.0:5000`
    pub bind: String,

    /// Maximum request body size in bytes
    pub max_payload_size: usize,

    /// Queue admitted jobs are pushed onto
    pub queue: String,
}

/// How workers reach devices through the system `ssh` client
#[derive(Clone, Debug)]
pub struct SshConfig {
    pub program: String,
    pub user: Option<String>,
    pub identity: Option<PathBuf>,
    pub connect_timeout: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            user: None,
            identity: None,
            connect_timeout: 10,
        }
    }
}

/// Worker pool launch settings
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub workers: usize,
    pub queues: Vec<String>,

    /// Prefix of every worker name, `<host_identity>_<ordinal>`
    pub host_identity: String,

    /// Fixed wait before any worker starts
    pub startup_delay: Duration,

    /// Backend PING attempts after the startup delay. Zero disables the probe.
    pub probe_attempts: u32,

    /// Relaunch workers whose task fails
    pub restart: bool,

    /// How long a single claim blocks before the worker loops
    pub claim_timeout: Duration,
}

/// Identity of this host used to derive worker names.
///
/// `HOSTNAME` wins when exported (containers set it); otherwise the kernel
/// hostname. `localhost` only when neither yields a name.
pub fn host_identity() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .or_else(system_hostname)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
