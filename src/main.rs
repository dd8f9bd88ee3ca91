//! queue-proxy
//!
//! An HTTP proxy that decouples accepting requests from fetching them.
//!
//! # Architecture Overview
//!
//! ```text
//!  server:      Client → axum → Dispatcher ── push ──▶ ┌──────────────┐
//!                                    ▲                 │ shared queue │
//!               Client ◀─ render ────┴──── pop ─────── │   (Redis)    │
//!                                                      └──────────────┘
//!  worker:      task feed ◀── get_request ─────────────────┘    ▲
//!                  ↓                                            │
//!               LocalBuffer → FetchWorker ×K → upstream → set_response
//! ```
//!
//! `server` and `worker` scale independently; `standalone` runs both in one
//! process.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use queue_proxy::config::{read_config, validate_config, ConfigError, ProxyConfig};
use queue_proxy::lifecycle::{self, RunMode};
use queue_proxy::observability::init_logging;

#[derive(Parser)]
#[command(name = "queue-proxy", version)]
#[command(about = "HTTP proxy that relays requests through a shared queue", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP front end
    Server {
        #[command(flatten)]
        server: ServerArgs,
        #[command(flatten)]
        redis: RedisArgs,
    },
    /// Run the worker pool
    Worker {
        #[command(flatten)]
        pool: PoolArgs,
        #[command(flatten)]
        redis: RedisArgs,
    },
    /// Run the front end and the worker pool in one process
    Standalone {
        #[command(flatten)]
        server: ServerArgs,
        #[command(flatten)]
        pool: PoolArgs,
        #[command(flatten)]
        redis: RedisArgs,
    },
}

#[derive(Args)]
struct ServerArgs {
    /// Address to listen on, e.g. 0.0.0.0:8080
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Args)]
struct PoolArgs {
    /// Number of live workers to maintain
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args)]
struct RedisArgs {
    #[arg(long)]
    redis_host: Option<String>,

    #[arg(long)]
    redis_port: Option<u16>,

    #[arg(long)]
    redis_database: Option<i64>,
}

impl ServerArgs {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
    }
}

impl PoolArgs {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(workers) = self.workers {
            config.pool.workers = workers;
        }
    }
}

impl RedisArgs {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(host) = &self.redis_host {
            config.redis.host = host.clone();
        }
        if let Some(port) = self.redis_port {
            config.redis.port = port;
        }
        if let Some(database) = self.redis_database {
            config.redis.database = database;
        }
    }
}

impl Command {
    /// Apply flag overrides and return the run mode.
    fn apply(&self, config: &mut ProxyConfig) -> RunMode {
        match self {
            Command::Server { server, redis } => {
                server.apply(config);
                redis.apply(config);
                RunMode::Server
            }
            Command::Worker { pool, redis } => {
                pool.apply(config);
                redis.apply(config);
                RunMode::Worker
            }
            Command::Standalone { server, pool, redis } => {
                server.apply(config);
                pool.apply(config);
                redis.apply(config);
                RunMode::Standalone
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    let mode = cli.command.apply(&mut config);

    init_logging(&config.observability);

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(%error, "Invalid configuration");
        }
        return Err(ConfigError::Validation(errors).into());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        redis_host = %config.redis.host,
        workers = config.pool.workers,
        backend = ?config.queue.backend,
        "Configuration loaded"
    );

    lifecycle::run(mode, config).await?;
    Ok(())
}
