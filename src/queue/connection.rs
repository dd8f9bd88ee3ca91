//! Lazily (re)established Redis connection with a fixed retry budget.
//!
//! # Design Decisions
//! - Nothing is dialed until the first call to `get`
//! - Every `get` validates a clone of the cached connection with PING,
//!   outside the cache lock
//! - A dead connection is replaced transparently, up to `attempts` tries
//!   spaced `retry_interval` apart; running out is `ConnectionFailed`

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use crate::config::RedisConfig;
use crate::queue::QueueError;

/// High level wrapper that hands out a live connection.
pub struct RedisConnection {
    client: redis::Client,
    cached: Mutex<Option<MultiplexedConnection>>,
    attempts: u32,
    retry_interval: Duration,
}

impl RedisConnection {
    /// Prepare a connection. Does not dial.
    pub fn new(config: &RedisConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.connection_info()).map_err(|e| QueueError::ConnectionFailed {
            attempts: 0,
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            cached: Mutex::new(None),
            attempts: config.connect_attempts.max(1),
            retry_interval: config.retry_interval(),
        })
    }

    /// Return a validated connection, reconnecting if the cached one is gone.
    ///
    /// The lock is held only to read the cache; the health check runs on a
    /// clone so concurrent callers do not queue behind each other's PING.
    pub async fn get(&self) -> Result<MultiplexedConnection, QueueError> {
        let cached = self.cached.lock().await.clone();
        if let Some(mut conn) = cached {
            match ping(&mut conn).await {
                Ok(()) => return Ok(conn),
                Err(e) => tracing::warn!(error = %e, "Redis connection lost, reconnecting"),
            }
        }
        self.reconnect().await
    }

    /// Replace the cached connection, up to `attempts` dials.
    async fn reconnect(&self) -> Result<MultiplexedConnection, QueueError> {
        let mut cached = self.cached.lock().await;

        // Another caller may have reconnected while we waited for the lock.
        if let Some(conn) = cached.as_mut() {
            if ping(conn).await.is_ok() {
                return Ok(conn.clone());
            }
            *cached = None;
        }

        let mut last_error = String::from("no attempt made");
        for attempt in 1..=self.attempts {
            match self.connect().await {
                Ok(conn) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "Redis connection re-established");
                    }
                    *cached = Some(conn.clone());
                    return Ok(conn);
                }
                Err(e) => {
                    tracing::warn!(attempt, max_attempts = self.attempts, error = %e, "Redis connection attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt < self.attempts {
                tokio::time::sleep(self.retry_interval).await;
            }
        }

        tracing::error!(attempts = self.attempts, error = %last_error, "Failed to connect to Redis");
        Err(QueueError::ConnectionFailed {
            attempts: self.attempts,
            reason: last_error,
        })
    }

    /// Dial and validate a fresh connection.
    async fn connect(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        ping(&mut conn).await?;
        Ok(conn)
    }
}

async fn ping(conn: &mut MultiplexedConnection) -> Result<(), redis::RedisError> {
    let _: String = redis::cmd("PING").query_async(conn).await?;
    Ok(())
}
