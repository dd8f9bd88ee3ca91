//! Redis-backed shared queue.
//!
//! # Key Layout
//!
//! - `{request_key}` (list): pending requests, LPUSH in / RPOP out (FIFO)
//! - `{response_key}` (hash): correlation id → serialized response
//! - `{response_key}:stored_at` (sorted set): correlation id scored by the
//!   unix time (ms) its response was stored, used for reclamation
//!
//! # Atomicity
//!
//! RPOP is atomic on its own. Taking a response is a check, a read and a
//! delete, so it runs as a Lua script; so does reclamation.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::{AsyncCommands, Script};

use crate::config::{QueueConfig, RedisConfig};
use crate::envelope::{Request, Response};
use crate::queue::connection::RedisConnection;
use crate::queue::{QueueError, SharedQueue};

const POP_RESPONSE: &str = r#"
local value = redis.call('HGET', KEYS[1], ARGV[1])
if value then
    redis.call('HDEL', KEYS[1], ARGV[1])
    redis.call('ZREM', KEYS[2], ARGV[1])
end
return value
"#;

const RECLAIM_RESPONSES: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
local removed = 0
for _, id in ipairs(ids) do
    removed = removed + redis.call('HDEL', KEYS[1], id)
    redis.call('ZREM', KEYS[2], id)
end
return removed
"#;

/// Simple Redis queue.
pub struct RedisQueue {
    connection: RedisConnection,
    request_key: String,
    response_key: String,
    stored_at_key: String,
    pop_script: Script,
    reclaim_script: Script,
}

impl RedisQueue {
    /// Create a queue without dialing; the first operation connects.
    pub fn new(redis: &RedisConfig, queue: &QueueConfig) -> Result<Self, QueueError> {
        Ok(Self {
            connection: RedisConnection::new(redis)?,
            request_key: queue.request_key.clone(),
            response_key: queue.response_key.clone(),
            stored_at_key: stored_at_key(&queue.response_key),
            pop_script: Script::new(POP_RESPONSE),
            reclaim_script: Script::new(RECLAIM_RESPONSES),
        })
    }

    /// Create a queue and validate the connection immediately.
    pub async fn connect(redis: &RedisConfig, queue: &QueueConfig) -> Result<Self, QueueError> {
        let this = Self::new(redis, queue)?;
        this.connection.get().await?;
        tracing::info!(
            host = %redis.host,
            port = redis.port,
            database = redis.database,
            "Connected to Redis"
        );
        Ok(this)
    }

    /// Number of pending requests.
    pub async fn pending_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection.get().await?;
        let len: usize = conn.llen(&self.request_key).await?;
        Ok(len)
    }

    /// Number of stored, not yet popped responses.
    pub async fn responses_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection.get().await?;
        let len: usize = conn.hlen(&self.response_key).await?;
        Ok(len)
    }
}

#[async_trait]
impl SharedQueue for RedisQueue {
    async fn push(&self, request: &Request) -> Result<(), QueueError> {
        let serialized = request.to_json()?;
        let mut conn = self.connection.get().await?;
        conn.lpush::<_, _, ()>(&self.request_key, serialized).await?;
        Ok(())
    }

    async fn get_request(&self) -> Result<Option<String>, QueueError> {
        let mut conn = self.connection.get().await?;
        let item: Option<String> = redis::cmd("RPOP")
            .arg(&self.request_key)
            .query_async(&mut conn)
            .await?;
        Ok(item)
    }

    async fn set_response(
        &self,
        request: &Request,
        response: &Response,
    ) -> Result<(), QueueError> {
        let serialized = response.to_json()?;
        let mut conn = self.connection.get().await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(&self.response_key, request.uuid(), serialized)
            .ignore()
            .zadd(&self.stored_at_key, request.uuid(), unix_millis())
            .ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn pop(&self, request: &Request) -> Result<Option<String>, QueueError> {
        let mut conn = self.connection.get().await?;
        let response: Option<String> = self
            .pop_script
            .key(&self.response_key)
            .key(&self.stored_at_key)
            .arg(request.uuid())
            .invoke_async(&mut conn)
            .await?;
        Ok(response)
    }

    async fn reclaim_abandoned(&self, max_age: Duration) -> Result<usize, QueueError> {
        let cutoff = unix_millis().saturating_sub(max_age.as_millis() as u64);
        let mut conn = self.connection.get().await?;
        let removed: usize = self
            .reclaim_script
            .key(&self.response_key)
            .key(&self.stored_at_key)
            .arg(cutoff)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed)
    }
}

fn stored_at_key(response_key: &str) -> String {
    format!("{}:stored_at", response_key)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
