use std::io;
use std::path::Path;

use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::cli::LogLevel;

impl LogLevel {
    /// Filter directive used when `RUST_LOG` is not set
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

/// Install the global subscriber.
///
/// Console output always; with `log_dir`, daily rotating files per level as
/// well, e.g. `logs/info.log.2026-10-17`, `logs/error.log.2026-10-17`.
pub fn init(level: LogLevel, log_dir: Option<&Path>) -> io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));

    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)?;
    }

    let debug_layer = log_dir.map(|dir| {
        tracing_subscriber::fmt::layer()
            .with_writer(tracing_appender::rolling::daily(dir, "debug.log"))
            .with_ansi(false)
            .with_filter(LevelFilter::DEBUG)
    });

    let info_layer = log_dir.map(|dir| {
        tracing_subscriber::fmt::layer()
            .with_writer(tracing_appender::rolling::daily(dir, "info.log"))
            .with_ansi(false)
            .with_filter(LevelFilter::INFO)
    });

    let warn_layer = log_dir.map(|dir| {
        tracing_subscriber::fmt::layer()
            .with_writer(tracing_appender::rolling::daily(dir, "warn.log"))
            .with_ansi(false)
            .with_filter(LevelFilter::WARN)
    });

    let error_layer = log_dir.map(|dir| {
        tracing_subscriber::fmt::layer()
            .with_writer(tracing_appender::rolling::daily(dir, "error.log"))
            .with_ansi(false)
            .with_filter(LevelFilter::ERROR)
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(debug_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_and_error_share_a_directive() {
        assert_eq!(LogLevel::Critical.directive(), "error");
        assert_eq!(LogLevel::Warning.directive(), "warn");
        assert_eq!(LogLevel::Debug.directive(), "debug");
    }
}
