//! Front-end dispatch: push a request, poll for its response.
//!
//! # Responsibilities
//! - Override the outbound identity headers (`User-Agent`, `Accept`)
//! - Push the request onto the shared queue exactly once
//! - Poll for the correlated response every `poll_interval` until it
//!   arrives or `timeout` elapses
//!
//! # Design Decisions
//! - Waiting is a bounded sleep-and-retry loop; latency is quantized to the
//!   poll interval and capped by the timeout
//! - After a timeout no further polls are issued; a late response is left
//!   for the reaper

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::Instrument;

use crate::config::DispatchConfig;
use crate::envelope::{Request, Response};
use crate::observability::metrics;
use crate::queue::{QueueError, SharedQueue};

/// User agent presented to upstream on behalf of every client.
pub const USER_AGENT: &str = "QueueProxy/0.1";

/// Accept header presented to upstream on behalf of every client.
pub const ACCEPT: &str = "*/*";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Shared queue failed: {0}")]
    Queue(#[from] QueueError),

    #[error("Stored response is malformed: {0}")]
    MalformedResponse(#[source] serde_json::Error),
}

/// Result of one dispatch.
#[derive(Debug)]
pub enum DispatchOutcome {
    Completed(Response),
    TimedOut,
}

/// Pushes requests and waits for their correlated responses.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn SharedQueue>,
    poll_interval: Duration,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn SharedQueue>, config: &DispatchConfig) -> Self {
        Self {
            queue,
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
        }
    }

    /// Replace the client's identity headers with the proxy's.
    pub fn prepare(request: Request) -> Request {
        request
            .with_header("User-Agent", USER_AGENT)
            .with_header("Accept", ACCEPT)
    }

    /// Dispatch one request and wait for its response.
    pub async fn dispatch(&self, request: Request) -> Result<DispatchOutcome, DispatchError> {
        let request = Self::prepare(request);
        let span = tracing::info_span!("dispatch", uuid = %request.uuid());

        async move {
            let start = Instant::now();
            let result = self.push_and_wait(&request, start).await;

            match &result {
                Ok(DispatchOutcome::Completed(response)) => {
                    tracing::debug!(status = %response.status(), "Response received");
                    metrics::record_dispatch("completed", start);
                }
                Ok(DispatchOutcome::TimedOut) => {
                    tracing::warn!(
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Timed out waiting for response"
                    );
                    metrics::record_dispatch("timeout", start);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Dispatch failed");
                    metrics::record_dispatch("error", start);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn push_and_wait(
        &self,
        request: &Request,
        start: Instant,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.queue.push(request).await?;
        tracing::debug!("Request queued");

        loop {
            if let Some(raw) = self.queue.pop(request).await? {
                let response =
                    Response::from_json(&raw).map_err(DispatchError::MalformedResponse)?;
                return Ok(DispatchOutcome::Completed(response));
            }
            if start.elapsed() >= self.timeout {
                return Ok(DispatchOutcome::TimedOut);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
