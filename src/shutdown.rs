use actix_web::dev::ServerHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::worker::PoolHandle;

enum Target {
    Server {
        handle: ServerHandle,
        task: JoinHandle<Result<(), std::io::Error>>,
    },
    Pool {
        pool: PoolHandle,
        shutdown_tx: watch::Sender<bool>,
    },
}

/// Handles graceful shutdown of either process surface
///
/// - API: stop accepting requests and let in-flight ones finish
/// - Worker pool: stop new claims, let in-flight jobs finish and report
pub struct ShutdownCoordinator {
    target: Target,
}

impl ShutdownCoordinator {
    pub fn for_server(handle: ServerHandle, task: JoinHandle<Result<(), std::io::Error>>) -> Self {
        Self {
            target: Target::Server { handle, task },
        }
    }

    pub fn for_pool(pool: PoolHandle, shutdown_tx: watch::Sender<bool>) -> Self {
        Self {
            target: Target::Pool { pool, shutdown_tx },
        }
    }

    /// Block until SIGINT/SIGTERM (or, for a pool, until every worker has
    /// exited on its own) and then shut down
    pub async fn wait_for_shutdown(self) -> Result<(), std::io::Error> {
        match self.target {
            Target::Server { handle, task } => {
                wait_for_signal().await;

                info!("Stopping HTTP server (no longer accepting new requests)...");
                handle.stop(true).await;
                match task.await {
                    Ok(Ok(())) => info!("HTTP server shut down successfully"),
                    Ok(Err(e)) => error!("HTTP server encountered error during shutdown: {:?}", e),
                    Err(e) => error!("HTTP server task panicked: {:?}", e),
                }
            }
            Target::Pool { pool, shutdown_tx } => {
                let num_workers = pool.len();
                let mut finished = Box::pin(pool.wait());

                let stopped = tokio::select! {
                    _ = wait_for_signal() => {
                        info!("Signaling {} workers to stop claiming new jobs...", num_workers);
                        if let Err(e) = shutdown_tx.send(true) {
                            error!("Failed to send shutdown signal to workers: {:?}", e);
                        }
                        let stopped = finished.await;
                        info!("Workers stopped ({}/{})", stopped, num_workers);
                        stopped
                    }
                    stopped = &mut finished => {
                        warn!("All workers exited ({}/{} cleanly)", stopped, num_workers);
                        stopped
                    }
                };

                if stopped == 0 && num_workers > 0 {
                    error!("No worker stopped cleanly");
                    return Err(std::io::Error::other(format!(
                        "all {} workers failed",
                        num_workers
                    )));
                }
            }
        }

        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received CTRL+C signal, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM signal, initiating graceful shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::device::fake::FakeConnector;
    use crate::queue::memory::MemoryBackend;
    use crate::worker::WorkerPool;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn pool_whose_workers_all_failed_exits_with_error() {
        let backend = MemoryBackend::new();
        backend.set_available(false);
        let config = PoolConfig {
            workers: 2,
            queues: vec!["naas".to_string()],
            host_identity: "edge01".to_string(),
            startup_delay: Duration::ZERO,
            probe_attempts: 0,
            restart: false,
            claim_timeout: Duration::from_millis(20),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = WorkerPool::new(config, Arc::new(backend), Arc::new(FakeConnector::default()))
            .launch(shutdown_rx)
            .await
            .unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            ShutdownCoordinator::for_pool(pool, shutdown_tx).wait_for_shutdown(),
        )
        .await
        .expect("coordinator kept waiting on dead workers");
        assert!(outcome.is_err());
    }
}
