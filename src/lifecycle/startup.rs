//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the metrics exporter when enabled
//! - Build the shared queue (Redis connection validated eagerly)
//! - Start the response reaper
//! - Run the front end, the worker pool, or both until a stop signal
//!
//! # Design Decisions
//! - Fail fast: an unreachable backing store at startup is fatal
//! - Listeners start last (traffic only when the queue is ready)
//! - On the way out the pool drains in-flight fetches before returning

use std::net::AddrParseError;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::init_metrics;
use crate::pool::{FetchError, HttpFetcher, PoolError, WorkerPoolSupervisor};
use crate::queue::{self, QueueError, ResponseReaper, SharedQueue};

/// Which halves of the proxy this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// HTTP front end only.
    Server,
    /// Worker pool only.
    Worker,
    /// Both, sharing one queue.
    Standalone,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid metrics address: {0}")]
    MetricsAddress(#[from] AddrParseError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Failed to build upstream client: {0}")]
    Fetcher(#[from] FetchError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("HTTP server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP server task panicked: {0}")]
    ServerPanicked(String),
}

/// Run the proxy in `mode` until a stop signal or a fatal error.
pub async fn run(mode: RunMode, config: ProxyConfig) -> Result<(), StartupError> {
    tracing::info!(?mode, "queue-proxy starting");

    if config.observability.metrics_enabled {
        init_metrics(config.observability.metrics_address.parse()?);
    }

    let queue = queue::from_config(&config).await?;
    let shutdown = Shutdown::new();

    let reaper = config.queue.response_ttl().map(|ttl| {
        let reaper = ResponseReaper::new(queue.clone(), ttl, config.queue.reclaim_interval());
        tokio::spawn(reaper.run(shutdown.subscribe()))
    });

    let result = match mode {
        RunMode::Server => run_server(&config, queue, &shutdown).await,
        RunMode::Worker => run_worker(&config, queue).await,
        RunMode::Standalone => run_standalone(&config, queue, &shutdown).await,
    };

    shutdown.trigger();
    if let Some(handle) = reaper {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Response reaper panicked");
        }
    }

    match &result {
        Ok(()) => tracing::info!("Shutdown complete"),
        Err(e) => tracing::error!(error = %e, "Stopped with error"),
    }
    result
}

async fn bind(config: &ProxyConfig) -> Result<TcpListener, std::io::Error> {
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");
    Ok(listener)
}

async fn run_server(
    config: &ProxyConfig,
    queue: Arc<dyn SharedQueue>,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    let listener = bind(config).await?;
    let server = HttpServer::new(config, queue);
    let mut server = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        _ = signals::wait_for_signal() => {}
        joined = &mut server => return flatten(joined),
    }
    shutdown.trigger();

    flatten(server.await)
}

async fn run_worker(config: &ProxyConfig, queue: Arc<dyn SharedQueue>) -> Result<(), StartupError> {
    let fetcher = Arc::new(HttpFetcher::new(&config.upstream)?);
    let mut pool = WorkerPoolSupervisor::new(&config.pool, queue, fetcher);
    pool.start()?;

    tokio::select! {
        _ = signals::wait_for_signal() => {}
        _ = pool.stopped() => tracing::warn!("Worker pool stopped on its own"),
    }

    pool.stop().await?;
    Ok(())
}

async fn run_standalone(
    config: &ProxyConfig,
    queue: Arc<dyn SharedQueue>,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    let fetcher = Arc::new(HttpFetcher::new(&config.upstream)?);
    let mut pool = WorkerPoolSupervisor::new(&config.pool, queue.clone(), fetcher);

    let listener = bind(config).await?;
    pool.start()?;
    let mut server =
        tokio::spawn(HttpServer::new(config, queue).run(listener, shutdown.subscribe()));

    let served = tokio::select! {
        _ = signals::wait_for_signal() => None,
        _ = pool.stopped() => {
            tracing::warn!("Worker pool stopped on its own");
            None
        }
        joined = &mut server => Some(flatten(joined)),
    };

    // Stop taking traffic before draining the pool.
    shutdown.trigger();
    let served = match served {
        Some(result) => result,
        None => flatten(server.await),
    };
    pool.stop().await?;
    served
}

fn flatten(
    joined: Result<Result<(), std::io::Error>, tokio::task::JoinError>,
) -> Result<(), StartupError> {
    match joined {
        Ok(result) => Ok(result?),
        Err(e) => Err(StartupError::ServerPanicked(e.to_string())),
    }
}
