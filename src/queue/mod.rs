//! Shared queue between the dispatcher and the worker pool.
//!
//! # Data Flow
//! ```text
//! Dispatcher                       Store                        Worker pool
//!   push(request) ──────────▶ [pending list] ──────────▶ get_request()
//!   pop(request)  ◀────────── [response map] ◀────────── set_response(request, response)
//! ```
//!
//! # Guarantees
//! - `get_request` removes the oldest pending request atomically; concurrent
//!   callers never receive the same one
//! - `pop` reads and deletes a response atomically; concurrent callers for
//!   the same id never both receive it
//! - `set_response` is last-write-wins per correlation id
//! - Losing the backing store after the retry budget is exhausted is a
//!   `QueueError::ConnectionFailed`, never a silent `None`
//!
//! # Backends
//! - `redis_queue.rs`: Redis list + hash (multi-process)
//! - `memory.rs`: mutex-guarded structures (single process, tests)

pub mod connection;
pub mod memory;
pub mod reaper;
pub mod redis_queue;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{ProxyConfig, QueueBackend};
use crate::envelope::{Request, Response};

pub use self::connection::RedisConnection;
pub use self::memory::InMemoryQueue;
pub use self::reaper::ResponseReaper;
pub use self::redis_queue::RedisQueue;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing store could not be reached within the retry budget.
    #[error("Failed to connect to the backing store after {attempts} attempts: {reason}")]
    ConnectionFailed { attempts: u32, reason: String },

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failed to serialize an envelope.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The coordination contract shared by producers and consumers.
///
/// Requests travel as serialized JSON; decoding is left to the consumer so
/// a malformed entry never poisons the queue itself.
#[async_trait]
pub trait SharedQueue: Send + Sync {
    /// Append a request to the pending sequence.
    async fn push(&self, request: &Request) -> Result<(), QueueError>;

    /// Atomically remove and return the oldest pending request.
    async fn get_request(&self) -> Result<Option<String>, QueueError>;

    /// Store the response for `request`, replacing any previous one.
    async fn set_response(&self, request: &Request, response: &Response)
        -> Result<(), QueueError>;

    /// Atomically take the response stored for `request`, if any.
    async fn pop(&self, request: &Request) -> Result<Option<String>, QueueError>;

    /// Delete responses that were stored more than `max_age` ago and never
    /// popped. Returns how many were removed.
    async fn reclaim_abandoned(&self, max_age: Duration) -> Result<usize, QueueError>;
}

/// Build the queue backend selected by the configuration.
///
/// For Redis the connection is established and validated here, so an
/// unreachable server is fatal at startup.
pub async fn from_config(config: &ProxyConfig) -> Result<Arc<dyn SharedQueue>, QueueError> {
    match config.queue.backend {
        QueueBackend::Redis => {
            let queue = RedisQueue::connect(&config.redis, &config.queue).await?;
            Ok(Arc::new(queue))
        }
        QueueBackend::Memory => {
            tracing::warn!("Using the in-process queue; workers in other processes cannot see it");
            Ok(Arc::new(InMemoryQueue::new()))
        }
    }
}
