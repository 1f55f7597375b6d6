use std::io;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

mod api;
mod cli;
mod config;
mod device;
mod logging;
mod queue;
mod shutdown;
mod worker;

use crate::api::{health::health_config, job::handlers::job_config, job::JobService};
use crate::cli::{Cli, Command, ServeArgs, WorkerArgs};
use crate::device::SshConnector;
use crate::queue::{JobQueue, QueueBackend, RedisBackend};
use crate::shutdown::ShutdownCoordinator;
use crate::worker::WorkerPool;

fn startup_error(err: impl std::fmt::Display) -> io::Error {
    io::Error::other(err.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load .env file if it exists; clap reads the variables
    dotenv::dotenv().ok();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Worker(args) => work(args).await,
    }
}

async fn serve(args: ServeArgs) -> io::Result<()> {
    logging::init(args.log.log_level, args.log.log_dir.as_deref())?;

    let backend_config = args.backend.backend_config();
    let server_config = args.server_config();

    info!("Starting naas admission API");
    info!("Configuration loaded successfully:");
    info!("  - Queue backend: {}", backend_config.address());
    info!("  - Queue: {}", server_config.queue);
    info!("  - Max payload size: {} bytes", server_config.max_payload_size);

    let backend = RedisBackend::new(backend_config).map_err(startup_error)?;
    let queue: Arc<dyn JobQueue> = Arc::from(backend.connect().await.map_err(startup_error)?);
    info!("Queue backend connection established");

    let service = web::Data::new(JobService::new(queue, server_config.queue.clone()));
    let max_payload_size = server_config.max_payload_size;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(web::PayloadConfig::default().limit(max_payload_size))
            .configure(health_config)
            .configure(job_config)
    })
    .disable_signals();

    info!("Server starting on http://{}", server_config.bind);
    let server = server.bind(&server_config.bind)?.run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    ShutdownCoordinator::for_server(server_handle, server_task)
        .wait_for_shutdown()
        .await
}

async fn work(args: WorkerArgs) -> io::Result<()> {
    logging::init(args.log.log_level, args.log.log_dir.as_deref())?;

    let backend_config = args.backend.backend_config();
    let pool_config = args.pool_config();
    let ssh_config = args.ssh_config();

    info!("Starting naas worker pool");
    info!("  - Workers: {}", pool_config.workers);
    info!("  - Queues: {:?}", pool_config.queues);
    info!("  - Queue backend: {}", backend_config.address());
    info!("  - Worker names: {}_<1..{}>", pool_config.host_identity, pool_config.workers);

    let backend = Arc::new(RedisBackend::new(backend_config).map_err(startup_error)?);
    let connector = Arc::new(SshConnector::new(ssh_config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = WorkerPool::new(pool_config, backend, connector)
        .launch(shutdown_rx)
        .await
        .map_err(startup_error)?;

    ShutdownCoordinator::for_pool(pool, shutdown_tx)
        .wait_for_shutdown()
        .await
}
