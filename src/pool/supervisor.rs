//! Worker pool supervisor.
//!
//! Owns two background loops:
//! - maintenance: keeps exactly `workers` one-shot workers alive, starting
//!   one replacement per pass and sleeping when the pool is full
//! - task feed: claims requests from the shared queue into the local buffer
//!   while it has room

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::PoolConfig;
use crate::envelope::Request;
use crate::observability::metrics;
use crate::pool::buffer::LocalBuffer;
use crate::pool::worker::{FetchWorker, Fetcher, WorkerOutcome};
use crate::pool::{PoolError, PoolState, PoolStats};
use crate::queue::{QueueError, SharedQueue};

/// Counters shared between the loops and the workers.
#[derive(Default)]
struct SharedPoolStats {
    live_workers: AtomicUsize,
    spawned: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    idle_exits: AtomicU64,
}

impl SharedPoolStats {
    fn record_outcome(&self, outcome: &WorkerOutcome) {
        match outcome {
            WorkerOutcome::Completed => self.completed.fetch_add(1, Ordering::SeqCst),
            WorkerOutcome::Idle => self.idle_exits.fetch_add(1, Ordering::SeqCst),
        };
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, target_workers: usize, buffered: usize) -> PoolStats {
        PoolStats {
            target_workers,
            live_workers: self.live_workers.load(Ordering::SeqCst),
            buffered,
            spawned: self.spawned.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            idle_exits: self.idle_exits.load(Ordering::SeqCst),
        }
    }
}

/// Everything a loop needs, cloned into each spawned task.
#[derive(Clone)]
struct PoolContext {
    target_workers: usize,
    poll_interval: Duration,
    queue: Arc<dyn SharedQueue>,
    fetcher: Arc<dyn Fetcher>,
    buffer: Arc<LocalBuffer>,
    stop: Arc<AtomicBool>,
    stats: Arc<SharedPoolStats>,
}

impl PoolContext {
    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn spawn_worker(&self, id: u64) -> JoinHandle<()> {
        let worker = FetchWorker::new(
            id,
            self.queue.clone(),
            self.buffer.clone(),
            self.fetcher.clone(),
            self.stop.clone(),
            self.poll_interval,
        );
        let stats = self.stats.clone();

        self.stats.spawned.fetch_add(1, Ordering::SeqCst);
        metrics::record_worker_spawned();

        tokio::spawn(
            async move {
                match worker.run().await {
                    Ok(outcome) => stats.record_outcome(&outcome),
                    Err(e) => {
                        stats.record_failure();
                        warn!(error = %e, "Worker failed");
                    }
                }
            }
            .instrument(tracing::info_span!("worker", id)),
        )
    }
}

/// Keep the pool at its target size until the stop flag is set.
///
/// Returns the workers still alive so `stop` can wait for them.
async fn maintain(ctx: PoolContext) -> Vec<JoinHandle<()>> {
    let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(ctx.target_workers);
    let mut next_id = 0u64;

    while !ctx.stopping() {
        let ended = reap_finished(&ctx, &mut workers).await;
        if ended > 0 {
            debug!(ended, "Purged finished workers");
        }

        ctx.stats.live_workers.store(workers.len(), Ordering::SeqCst);
        metrics::record_live_workers(workers.len());

        if workers.len() >= ctx.target_workers {
            tokio::time::sleep(ctx.poll_interval).await;
            continue;
        }

        workers.push(ctx.spawn_worker(next_id));
        next_id += 1;
        tokio::task::yield_now().await;
    }

    debug!(live = workers.len(), "Maintenance loop stopped");
    workers
}

/// Join every finished worker, counting panics as failures.
async fn reap_finished(ctx: &PoolContext, workers: &mut Vec<JoinHandle<()>>) -> usize {
    let (finished, running): (Vec<_>, Vec<_>) =
        workers.drain(..).partition(|handle| handle.is_finished());
    *workers = running;

    let ended = finished.len();
    for handle in finished {
        if let Err(e) = handle.await {
            ctx.stats.record_failure();
            error!(error = %e, "Worker panicked");
        }
    }
    ended
}

/// Buffer a claimed request, returning it to the shared queue when full.
///
/// Failing to return it sets the stop flag: the request would be lost.
async fn hand_off(ctx: &PoolContext, request: Request) -> Result<(), QueueError> {
    let Err(request) = ctx.buffer.try_push(request) else {
        return Ok(());
    };

    warn!(uuid = %request.uuid(), "Local buffer full, returning request to the queue");
    if let Err(e) = ctx.queue.push(&request).await {
        error!(uuid = %request.uuid(), error = %e, "Failed to return request, stopping pool");
        ctx.stop.store(true, Ordering::SeqCst);
        return Err(e);
    }
    Ok(())
}

/// Move requests from the shared queue into the local buffer.
async fn feed(ctx: PoolContext) -> Result<(), QueueError> {
    while !ctx.stopping() {
        if !ctx.buffer.has_room() {
            tokio::time::sleep(ctx.poll_interval).await;
            continue;
        }

        let raw = match ctx.queue.get_request().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tokio::time::sleep(ctx.poll_interval).await;
                continue;
            }
            Err(e @ QueueError::ConnectionFailed { .. }) => {
                error!(error = %e, "Lost the shared queue, stopping pool");
                ctx.stop.store(true, Ordering::SeqCst);
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "Failed to claim request");
                tokio::time::sleep(ctx.poll_interval).await;
                continue;
            }
        };

        let request = match Request::from_json(&raw) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Discarding malformed request");
                continue;
            }
        };

        debug!(uuid = %request.uuid(), "Claimed request");
        hand_off(&ctx, request).await?;
        metrics::record_buffer_depth(ctx.buffer.len());
    }

    debug!("Task feed stopped");
    Ok(())
}

/// Supervises the maintenance and task-feed loops of one worker pool.
pub struct WorkerPoolSupervisor {
    ctx: PoolContext,
    state: Arc<AtomicU8>,
    maintenance: Option<JoinHandle<Vec<JoinHandle<()>>>>,
    feeder: Option<JoinHandle<Result<(), QueueError>>>,
}

impl WorkerPoolSupervisor {
    pub fn new(config: &PoolConfig, queue: Arc<dyn SharedQueue>, fetcher: Arc<dyn Fetcher>) -> Self {
        let target_workers = config.workers;
        Self {
            ctx: PoolContext {
                target_workers,
                poll_interval: config.poll_interval(),
                queue,
                fetcher,
                buffer: Arc::new(LocalBuffer::new(target_workers)),
                stop: Arc::new(AtomicBool::new(false)),
                stats: Arc::new(SharedPoolStats::default()),
            },
            state: Arc::new(AtomicU8::new(PoolState::Idle as u8)),
            maintenance: None,
            feeder: None,
        }
    }

    pub fn state(&self) -> PoolState {
        PoolState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> PoolStats {
        self.ctx
            .stats
            .to_pool_stats(self.ctx.target_workers, self.ctx.buffer.len())
    }

    /// True once a stop was requested or the task feed failed.
    pub fn is_stopping(&self) -> bool {
        self.ctx.stopping()
    }

    /// Start both background loops.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.state() != PoolState::Idle {
            return Err(PoolError::AlreadyRunning);
        }

        info!(workers = self.ctx.target_workers, "Starting worker pool");

        self.maintenance = Some(tokio::spawn(
            maintain(self.ctx.clone()).instrument(tracing::info_span!("pool_maintenance")),
        ));
        self.feeder = Some(tokio::spawn(
            feed(self.ctx.clone()).instrument(tracing::info_span!("pool_feed")),
        ));

        self.state.store(PoolState::Running as u8, Ordering::SeqCst);
        Ok(())
    }

    /// Resolve once the pool stops on its own (task feed failure).
    pub async fn stopped(&self) {
        while !self.ctx.stopping() {
            tokio::time::sleep(self.ctx.poll_interval).await;
        }
    }

    /// Stop claiming work, let in-flight fetches finish and join every task.
    ///
    /// Returns the task-feed error if the pool stopped because the shared
    /// queue was lost.
    pub async fn stop(&mut self) -> Result<(), PoolError> {
        if self.state() != PoolState::Running {
            return Err(PoolError::NotRunning);
        }

        info!("Stopping worker pool");
        self.state.store(PoolState::Draining as u8, Ordering::SeqCst);
        self.ctx.stop.store(true, Ordering::SeqCst);

        let feed_result = match self.feeder.take() {
            Some(handle) => match handle.await {
                Ok(result) => result.map_err(PoolError::from),
                Err(e) => Err(PoolError::TaskPanicked(e.to_string())),
            },
            None => Ok(()),
        };

        let workers = match self.maintenance.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                error!(error = %e, "Maintenance loop panicked");
                Vec::new()
            }),
            None => Vec::new(),
        };

        debug!(remaining = workers.len(), "Waiting for workers to finish");
        for handle in workers {
            if let Err(e) = handle.await {
                self.ctx.stats.record_failure();
                error!(error = %e, "Worker panicked");
            }
        }

        self.ctx.stats.live_workers.store(0, Ordering::SeqCst);
        metrics::record_live_workers(0);
        self.state.store(PoolState::Stopped as u8, Ordering::SeqCst);

        let stats = self.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            idle_exits = stats.idle_exits,
            "Worker pool stopped"
        );

        feed_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Headers, RequestFields, Response};
    use crate::pool::worker::FetchError;
    use crate::queue::InMemoryQueue;
    use async_trait::async_trait;

    struct EchoFetcher;

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            Ok(Response::for_request(
                request,
                "200 OK",
                Headers::new(),
                request.uuid().to_string(),
            ))
        }
    }

    struct PanicFetcher;

    #[async_trait]
    impl Fetcher for PanicFetcher {
        async fn fetch(&self, _: &Request) -> Result<Response, FetchError> {
            panic!("fetcher exploded");
        }
    }

    struct DownQueue;

    #[async_trait]
    impl SharedQueue for DownQueue {
        async fn push(&self, _: &Request) -> Result<(), QueueError> {
            Err(down())
        }
        async fn get_request(&self) -> Result<Option<String>, QueueError> {
            Err(down())
        }
        async fn set_response(&self, _: &Request, _: &Response) -> Result<(), QueueError> {
            Err(down())
        }
        async fn pop(&self, _: &Request) -> Result<Option<String>, QueueError> {
            Err(down())
        }
        async fn reclaim_abandoned(&self, _: Duration) -> Result<usize, QueueError> {
            Err(down())
        }
    }

    fn down() -> QueueError {
        QueueError::ConnectionFailed {
            attempts: 1,
            reason: "down".into(),
        }
    }

    fn config(workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            poll_interval_ms: 5,
        }
    }

    fn request(uuid: &str) -> Request {
        Request::new(RequestFields {
            method: Some("GET".into()),
            uuid: Some(uuid.into()),
            ..Default::default()
        })
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_pool_converges_to_target() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut pool = WorkerPoolSupervisor::new(&config(3), queue, Arc::new(EchoFetcher));
        pool.start().unwrap();
        assert_eq!(pool.state(), PoolState::Running);

        wait_until(|| pool.stats().live_workers == 3).await;
        assert_eq!(pool.stats().spawned, 3);

        pool.stop().await.unwrap();
        assert_eq!(pool.state(), PoolState::Stopped);
        let stats = pool.stats();
        assert_eq!(stats.idle_exits, 3);
        assert_eq!(stats.live_workers, 0);
    }

    #[tokio::test]
    async fn test_pool_processes_and_replaces_workers() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut pool =
            WorkerPoolSupervisor::new(&config(2), queue.clone(), Arc::new(EchoFetcher));

        let requests: Vec<Request> = (0..5).map(|i| request(&format!("req-{i}"))).collect();
        for req in &requests {
            queue.push(req).await.unwrap();
        }

        pool.start().unwrap();
        wait_until(|| pool.stats().completed == 5).await;

        for req in &requests {
            let raw = queue.pop(req).await.unwrap().unwrap();
            let response = Response::from_json(&raw).unwrap();
            assert_eq!(response.body(), req.uuid());
        }

        // Every completion was followed by a replacement.
        wait_until(|| pool.stats().spawned >= 7).await;
        pool.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_idle() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut pool = WorkerPoolSupervisor::new(&config(1), queue, Arc::new(EchoFetcher));

        assert!(matches!(pool.stop().await, Err(PoolError::NotRunning)));
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(PoolError::AlreadyRunning)));
        pool.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_panicked_worker_counts_as_failure() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.push(&request("boom")).await.unwrap();

        let mut pool = WorkerPoolSupervisor::new(&config(1), queue, Arc::new(PanicFetcher));
        pool.start().unwrap();

        wait_until(|| pool.stats().failed == 1).await;
        wait_until(|| pool.stats().spawned == 2).await;
        pool.stop().await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.idle_exits, 1);
    }

    #[tokio::test]
    async fn test_failed_push_back_sets_stop_flag() {
        let pool = WorkerPoolSupervisor::new(&config(1), Arc::new(DownQueue), Arc::new(EchoFetcher));
        let ctx = pool.ctx.clone();
        ctx.buffer.try_push(request("first")).unwrap();

        let result = hand_off(&ctx, request("second")).await;
        assert!(matches!(result, Err(QueueError::ConnectionFailed { .. })));
        assert!(pool.is_stopping());
        tokio::time::timeout(Duration::from_secs(1), pool.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_buffer_returns_request_to_queue() {
        let queue = Arc::new(InMemoryQueue::new());
        let pool = WorkerPoolSupervisor::new(&config(1), queue.clone(), Arc::new(EchoFetcher));
        let ctx = pool.ctx.clone();
        ctx.buffer.try_push(request("first")).unwrap();

        hand_off(&ctx, request("second")).await.unwrap();
        assert!(!pool.is_stopping());
        assert_eq!(ctx.buffer.len(), 1);
        let raw = queue.get_request().await.unwrap().unwrap();
        assert_eq!(Request::from_json(&raw).unwrap().uuid(), "second");
    }

    #[tokio::test]
    async fn test_feed_failure_stops_pool() {
        let mut pool =
            WorkerPoolSupervisor::new(&config(1), Arc::new(DownQueue), Arc::new(EchoFetcher));
        pool.start().unwrap();

        tokio::time::timeout(Duration::from_secs(1), pool.stopped())
            .await
            .unwrap();
        assert!(pool.is_stopping());

        let result = pool.stop().await;
        assert!(matches!(
            result,
            Err(PoolError::Queue(QueueError::ConnectionFailed { .. }))
        ));
        assert_eq!(pool.state(), PoolState::Stopped);
    }
}
