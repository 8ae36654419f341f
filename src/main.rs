use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use docpipe::{
    api,
    config::Config,
    db,
    documents::{FolderResolver, SqliteRepository},
    ingest::{IngestionService, StorageLayout},
    jobs::{CommandProcessor, PoolConfig, WorkerPool},
    logging,
    metrics::PoolMetrics,
    vector::{VectorSettings, WeaviateService},
};
use tokio::net::TcpListener;

const JOB_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);
const JOB_RETENTION: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let config = Config::load().context("invalid configuration")?;

    let pool = db::connect(&config.database_url)
        .await
        .context("failed to open database")?;
    db::migrate(&pool)
        .await
        .context("failed to migrate database")?;
    let repository = Arc::new(SqliteRepository::new(pool));

    let index = Arc::new(
        WeaviateService::new(VectorSettings::from_config(&config))
            .context("invalid vector index settings")?,
    );
    let workers = Arc::new(WorkerPool::start(
        PoolConfig::from_config(&config),
        repository.clone(),
        Arc::new(CommandProcessor::from_config(&config)),
        index.clone(),
        Arc::new(PoolMetrics::new()),
    ));
    spawn_job_cleanup(workers.clone());

    let service = Arc::new(IngestionService::new(
        repository.clone(),
        FolderResolver::new(repository),
        workers.clone(),
        index,
        StorageLayout::from_config(&config),
    ));
    let app = api::create_router(service);

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    workers.shutdown().await;
    Ok(())
}

fn spawn_job_cleanup(workers: Arc<WorkerPool>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(JOB_CLEANUP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = workers.cleanup_finished(JOB_RETENTION).await;
            if removed > 0 {
                tracing::debug!(removed, "Dropped finished jobs from the job table");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received; draining worker pool");
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
