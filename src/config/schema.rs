//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::{Deserialize, Serialize};

/// Root configuration for the queue proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Redis connection settings.
    pub redis: RedisConfig,

    /// Shared queue layout and response retention.
    pub queue: QueueConfig,

    /// Front-end dispatch polling.
    pub dispatch: DispatchConfig,

    /// Worker pool sizing and polling.
    pub pool: PoolConfig,

    /// Outbound fetch target.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest inbound request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Redis connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Host name or IP address of the Redis server.
    pub host: String,

    /// Redis server port.
    pub port: u16,

    /// Logical database index.
    pub database: i64,

    /// Optional AUTH password.
    pub password: Option<String>,

    /// Connection attempts before giving up (fatal).
    pub connect_attempts: u32,

    /// Pause between connection attempts in milliseconds.
    pub retry_interval_ms: u64,
}

impl RedisConfig {
    /// Connection parameters for `redis::Client::open`.
    ///
    /// Built field by field so credentials never pass through URL parsing.
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.database,
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "redis".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connect_attempts: 3,
            retry_interval_ms: 100,
        }
    }
}

/// Which store backs the shared queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// External Redis server (multi-process deployments).
    Redis,
    /// In-process store; only meaningful in standalone mode.
    Memory,
}

/// Shared queue layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,

    /// List holding pending serialized requests.
    pub request_key: String,

    /// Hash holding serialized responses keyed by correlation id.
    pub response_key: String,

    /// Age after which an unclaimed response is deleted (0 disables).
    pub response_ttl_secs: u64,

    /// How often abandoned responses are swept.
    pub reclaim_interval_secs: u64,
}

impl QueueConfig {
    pub fn response_ttl(&self) -> Option<Duration> {
        (self.response_ttl_secs > 0).then(|| Duration::from_secs(self.response_ttl_secs))
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Redis,
            request_key: "request".to_string(),
            response_key: "response".to_string(),
            response_ttl_secs: 60,
            reclaim_interval_secs: 30,
        }
    }
}

/// Front-end dispatch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Pause between response polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Give up and answer 504 after this many milliseconds.
    pub timeout_ms: u64,
}

impl DispatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            timeout_ms: 8_000,
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Target number of live one-shot workers (also the local buffer size).
    pub workers: usize,

    /// Pause used by every pool loop when it has nothing to do.
    pub poll_interval_ms: u64,
}

impl PoolConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_worker_count() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus * 2 + 1
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            poll_interval_ms: 100,
        }
    }
}

/// Outbound fetch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL every request is fetched from.
    pub target: String,

    /// Append the inbound request URI to `target` instead of always
    /// fetching `target` itself.
    pub route_by_path: bool,

    /// Outbound request timeout in seconds.
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            target: "https://example.com".to_string(),
            route_by_path: false,
            timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
