//! One-shot fetch workers.
//!
//! A worker takes exactly one request from the local buffer, fetches it
//! from the upstream target, publishes the correlated response and ends.
//! It never loops and never retries: a failed fetch ends the worker with an
//! error and the supervisor starts a replacement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::envelope::{is_hop_by_hop, Headers, Request, Response};
use crate::observability::metrics;
use crate::pool::buffer::LocalBuffer;
use crate::queue::{QueueError, SharedQueue};

/// Errors raised while fetching from upstream.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("Invalid upstream target: {0}")]
    InvalidTarget(#[from] url::ParseError),

    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors that end a worker before it publishes a response.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to publish response: {0}")]
    Publish(#[from] QueueError),
}

/// Performs the outbound call for one request.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Fetcher backed by a shared `reqwest::Client`.
pub struct HttpFetcher {
    client: reqwest::Client,
    target: Url,
    route_by_path: bool,
}

impl HttpFetcher {
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetchError> {
        let target = Url::parse(&config.target)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            target,
            route_by_path: config.route_by_path,
        })
    }

    /// URL fetched for `request`.
    ///
    /// With `route_by_path` the request's origin-form URI is resolved against
    /// the target; anything else (absent, empty, absolute-form) falls back to
    /// the target itself. A resolved URL must keep the target's scheme, host
    /// and port, so network-path references like `//other.host/` fall back too.
    pub fn target_for(&self, request: &Request) -> Result<Url, FetchError> {
        if self.route_by_path {
            if let Some(uri) = request.uri().filter(|uri| uri.starts_with('/')) {
                let joined = self.target.join(uri)?;
                if joined.origin() == self.target.origin() {
                    return Ok(joined);
                }
                tracing::warn!(
                    uuid = %request.uuid(),
                    uri = %uri,
                    "Request URI resolves to another origin, using target"
                );
            }
        }
        Ok(self.target.clone())
    }
}

fn forwardable(name: &str) -> bool {
    !matches!(name, "Host" | "Content-Length") && !is_hop_by_hop(name)
}

/// "200 OK" style status line.
fn status_line(status: reqwest::StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let method = match request.method() {
            Some(m) => Method::from_bytes(m.as_bytes())
                .map_err(|_| FetchError::InvalidMethod(m.to_string()))?,
            None => Method::GET,
        };
        let url = self.target_for(request)?;

        let mut builder = self.client.request(method, url);
        for (name, value) in request.headers().iter().filter(|(name, _)| forwardable(name)) {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_string());
        }

        let upstream = builder.send().await?;
        let status = status_line(upstream.status());

        let mut headers = Headers::new();
        for (name, value) in upstream.headers() {
            headers.append(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }

        let body = upstream.bytes().await?;
        Ok(Response::for_request(
            request,
            status,
            headers,
            String::from_utf8_lossy(&body),
        ))
    }
}

/// How a worker ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Fetched and published one response.
    Completed,
    /// The pool stopped before any request arrived.
    Idle,
}

/// A single-task worker.
pub struct FetchWorker {
    id: u64,
    queue: Arc<dyn SharedQueue>,
    buffer: Arc<LocalBuffer>,
    fetcher: Arc<dyn Fetcher>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl FetchWorker {
    pub fn new(
        id: u64,
        queue: Arc<dyn SharedQueue>,
        buffer: Arc<LocalBuffer>,
        fetcher: Arc<dyn Fetcher>,
        stop: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            buffer,
            fetcher,
            stop,
            poll_interval,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for a buffered request, or `None` once the pool is stopping.
    async fn take_task(&self) -> Option<Request> {
        loop {
            if let Some(request) = self.buffer.try_take() {
                return Some(request);
            }
            if self.stop.load(Ordering::SeqCst) {
                return None;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Run one fetch-and-publish cycle.
    pub async fn run(self) -> Result<WorkerOutcome, WorkerError> {
        let Some(request) = self.take_task().await else {
            tracing::debug!("No request received before shutdown");
            return Ok(WorkerOutcome::Idle);
        };

        tracing::info!(
            uuid = %request.uuid(),
            method = ?request.method(),
            uri = ?request.uri(),
            "Request received"
        );

        let response = match self.fetcher.fetch(&request).await {
            Ok(response) => {
                metrics::record_fetch("ok");
                response
            }
            Err(e) => {
                metrics::record_fetch("error");
                return Err(e.into());
            }
        };

        tracing::debug!(uuid = %request.uuid(), status = %response.status(), "Publishing response");
        self.queue.set_response(&request, &response).await?;
        Ok(WorkerOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::RequestFields;
    use crate::queue::InMemoryQueue;

    struct StaticFetcher;

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            Ok(Response::for_request(request, "200 OK", Headers::new(), "hi"))
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            Err(FetchError::InvalidMethod(
                request.method().unwrap_or_default().to_string(),
            ))
        }
    }

    fn request(uuid: &str, uri: Option<&str>) -> Request {
        Request::new(RequestFields {
            method: Some("GET".into()),
            uri: uri.map(str::to_string),
            uuid: Some(uuid.into()),
            ..Default::default()
        })
    }

    fn worker(
        queue: Arc<InMemoryQueue>,
        buffer: Arc<LocalBuffer>,
        fetcher: Arc<dyn Fetcher>,
        stop: Arc<AtomicBool>,
    ) -> FetchWorker {
        FetchWorker::new(0, queue, buffer, fetcher, stop, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_worker_publishes_correlated_response() {
        let queue = Arc::new(InMemoryQueue::new());
        let buffer = Arc::new(LocalBuffer::new(1));
        let req = request("abc", Some("/x"));
        buffer.try_push(req.clone()).unwrap();

        let outcome = worker(
            queue.clone(),
            buffer.clone(),
            Arc::new(StaticFetcher),
            Arc::new(AtomicBool::new(false)),
        )
        .run()
        .await
        .unwrap();
        assert_eq!(outcome, WorkerOutcome::Completed);

        let raw = queue.pop(&req).await.unwrap().unwrap();
        let response = Response::from_json(&raw).unwrap();
        assert_eq!(response.uuid(), "abc");
        assert_eq!(response.status(), "200 OK");
        assert_eq!(response.body(), "hi");
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_worker_exits_idle_on_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(
            worker(
                Arc::new(InMemoryQueue::new()),
                Arc::new(LocalBuffer::new(1)),
                Arc::new(StaticFetcher),
                stop.clone(),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        stop.store(true, Ordering::SeqCst);
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, WorkerOutcome::Idle);
    }

    #[tokio::test]
    async fn test_fetch_failure_ends_worker_without_response() {
        let queue = Arc::new(InMemoryQueue::new());
        let buffer = Arc::new(LocalBuffer::new(1));
        let req = request("boom", None);
        buffer.try_push(req.clone()).unwrap();

        let result = worker(
            queue.clone(),
            buffer,
            Arc::new(FailingFetcher),
            Arc::new(AtomicBool::new(false)),
        )
        .run()
        .await;

        assert!(matches!(result, Err(WorkerError::Fetch(_))));
        assert!(queue.pop(&req).await.unwrap().is_none());
    }

    #[test]
    fn test_target_for_fixed_and_routed() {
        let mut config = UpstreamConfig {
            target: "http://backend.local:8000/".into(),
            ..Default::default()
        };
        let fixed = HttpFetcher::new(&config).unwrap();
        assert_eq!(
            fixed.target_for(&request("a", Some("/x?y=1"))).unwrap().as_str(),
            "http://backend.local:8000/"
        );

        config.route_by_path = true;
        let routed = HttpFetcher::new(&config).unwrap();
        assert_eq!(
            routed.target_for(&request("a", Some("/x?y=1"))).unwrap().as_str(),
            "http://backend.local:8000/x?y=1"
        );
        assert_eq!(
            routed
                .target_for(&request("a", Some("http://elsewhere/")))
                .unwrap()
                .as_str(),
            "http://backend.local:8000/"
        );
        assert_eq!(
            routed.target_for(&request("a", None)).unwrap().as_str(),
            "http://backend.local:8000/"
        );
    }

    #[test]
    fn test_target_for_keeps_target_origin() {
        let config = UpstreamConfig {
            target: "http://backend.local:8000/".into(),
            route_by_path: true,
            ..Default::default()
        };
        let routed = HttpFetcher::new(&config).unwrap();

        for uri in ["//evil.example/steal", "/\\evil.example/steal", "//backend.local/x"] {
            let url = routed.target_for(&request("a", Some(uri))).unwrap();
            assert_eq!(url.host_str(), Some("backend.local"), "{uri}");
            assert_eq!(url.port(), Some(8000), "{uri}");
            assert_eq!(url.as_str(), "http://backend.local:8000/", "{uri}");
        }

        let same_origin = routed
            .target_for(&request("a", Some("//backend.local:8000/y")))
            .unwrap();
        assert_eq!(same_origin.as_str(), "http://backend.local:8000/y");
    }

    #[test]
    fn test_forwardable_headers() {
        assert!(forwardable("User-Agent"));
        assert!(forwardable("Accept"));
        assert!(!forwardable("Host"));
        assert!(!forwardable("Content-Length"));
        assert!(!forwardable("Transfer-Encoding"));
    }

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(reqwest::StatusCode::OK), "200 OK");
        assert_eq!(status_line(reqwest::StatusCode::NOT_FOUND), "404 Not Found");
        assert_eq!(status_line(reqwest::StatusCode::from_u16(599).unwrap()), "599");
    }
}
