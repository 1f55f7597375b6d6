use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{self, BackendConfig, PoolConfig, ServerConfig, SshConfig};

#[derive(Parser, Debug)]
#[command(name = "naas", version, about = "Network device job admission API and worker pool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP admission API
    Serve(ServeArgs),
    /// Launch the worker pool
    Worker(WorkerArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
    #[value(name = "CRITICAL")]
    Critical,
}

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// What log-level are we to log at
    #[arg(short, long, value_enum, ignore_case = true, env = "NAAS_LOG_LEVEL", default_value = "INFO")]
    pub log_level: LogLevel,

    /// Also write daily rotated log files into this directory
    #[arg(long, env = "NAAS_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// What Redis server are we using?
    #[arg(short, long, env = "REDIS_HOST", default_value = "redis")]
    pub redis: String,

    /// What port is the Redis server listening on?
    #[arg(short, long, env = "REDIS_PORT", default_value_t = 6379)]
    pub port: u16,

    /// Password if the Redis server requires authentication
    #[arg(short, long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub auth_password: Option<String>,

    /// Seconds queued markers and results are kept
    #[arg(long, env = "NAAS_RESULT_TTL", default_value_t = 86_400)]
    pub result_ttl: u64,
}

impl BackendArgs {
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            host: self.redis.clone(),
            port: self.port,
            password: self.auth_password.clone().filter(|p| !p.is_empty()),
            result_ttl: self.result_ttl,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "NAAS_BIND", default_value = "0.0.0.0:5000")]
    pub bind: String,

    /// Queue admitted jobs are pushed onto
    #[arg(short, long, env = "NAAS_QUEUE", default_value = "naas")]
    pub queue: String,

    /// Maximum request body in bytes
    #[arg(long, env = "NAAS_MAX_PAYLOAD", default_value_t = 1024 * 1024)]
    pub max_payload: usize,

    #[command(flatten)]
    pub backend: BackendArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

impl ServeArgs {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind.clone(),
            max_payload_size: self.max_payload,
            queue: self.queue.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// The number of workers to launch
    #[arg(env = "NAAS_WORKERS", default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    pub workers: u32,

    /// What queue(s) are we working out of?
    #[arg(short, long, env = "NAAS_QUEUES", num_args = 1.., value_delimiter = ',', default_value = "naas")]
    pub queues: Vec<String>,

    /// How many seconds to sleep to give Redis a chance to initialize
    #[arg(short, long, env = "NAAS_STARTUP_DELAY", default_value_t = 10)]
    pub sleep: u64,

    /// PING the backend up to N times (with backoff) after the sleep; 0 disables
    #[arg(long, env = "NAAS_PROBE_ATTEMPTS", default_value_t = 0)]
    pub probe_attempts: u32,

    /// Relaunch a worker whose task fails
    #[arg(long, env = "NAAS_RESTART")]
    pub restart: bool,

    /// Seconds a single claim blocks before the worker loops
    #[arg(long, env = "NAAS_CLAIM_TIMEOUT", default_value_t = 5)]
    pub claim_timeout: u64,

    /// ssh client binary
    #[arg(long, env = "NAAS_SSH_PROGRAM", default_value = "ssh")]
    pub ssh_program: String,

    /// Login user on the devices
    #[arg(long, env = "NAAS_SSH_USER")]
    pub ssh_user: Option<String>,

    /// Private key used for device logins
    #[arg(long, env = "NAAS_SSH_IDENTITY")]
    pub ssh_identity: Option<PathBuf>,

    /// Seconds to wait for a device to accept the connection
    #[arg(long, env = "NAAS_SSH_CONNECT_TIMEOUT", default_value_t = 10)]
    pub ssh_connect_timeout: u64,

    #[command(flatten)]
    pub backend: BackendArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

impl WorkerArgs {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers as usize,
            queues: self.queues.clone(),
            host_identity: config::host_identity(),
            startup_delay: Duration::from_secs(self.sleep),
            probe_attempts: self.probe_attempts,
            restart: self.restart,
            claim_timeout: Duration::from_secs(self.claim_timeout.max(1)),
        }
    }

    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            program: self.ssh_program.clone(),
            user: self.ssh_user.clone(),
            identity: self.ssh_identity.clone(),
            connect_timeout: self.ssh_connect_timeout,
        }
    }
}
