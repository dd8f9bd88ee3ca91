//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, worker count > 0)
//! - Check addresses and the upstream target parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("dispatch.poll_interval_ms ({poll_ms}) must be less than dispatch.timeout_ms ({timeout_ms})")]
    PollExceedsTimeout { poll_ms: u64, timeout_ms: u64 },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("queue.request_key and queue.response_key must differ")]
    KeyCollision,

    #[error("upstream.target {value:?} is not an http(s) URL")]
    InvalidTarget { value: String },

    #[error("observability.log_level {value:?} is not one of trace, debug, info, warn, error")]
    InvalidLogLevel { value: String },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_body_bytes" });
    }

    if config.redis.host.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "redis.host" });
    }
    if config.redis.connect_attempts == 0 {
        errors.push(ValidationError::Zero { field: "redis.connect_attempts" });
    }

    if config.queue.request_key.is_empty() {
        errors.push(ValidationError::Empty { field: "queue.request_key" });
    }
    if config.queue.response_key.is_empty() {
        errors.push(ValidationError::Empty { field: "queue.response_key" });
    }
    if !config.queue.request_key.is_empty()
        && config.queue.request_key == config.queue.response_key
    {
        errors.push(ValidationError::KeyCollision);
    }
    if config.queue.response_ttl_secs > 0 && config.queue.reclaim_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "queue.reclaim_interval_secs" });
    }

    if config.dispatch.poll_interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "dispatch.poll_interval_ms" });
    }
    if config.dispatch.timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "dispatch.timeout_ms" });
    }
    if config.dispatch.timeout_ms > 0 && config.dispatch.poll_interval_ms >= config.dispatch.timeout_ms {
        errors.push(ValidationError::PollExceedsTimeout {
            poll_ms: config.dispatch.poll_interval_ms,
            timeout_ms: config.dispatch.timeout_ms,
        });
    }

    if config.pool.workers == 0 {
        errors.push(ValidationError::Zero { field: "pool.workers" });
    }
    if config.pool.poll_interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "pool.poll_interval_ms" });
    }

    match Url::parse(&config.upstream.target) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        _ => errors.push(ValidationError::InvalidTarget {
            value: config.upstream.target.clone(),
        }),
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "upstream.timeout_secs" });
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::InvalidLogLevel {
            value: config.observability.log_level.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
