//! Periodic reclamation of abandoned responses.
//!
//! A response the dispatcher gave up on (504 already sent) is never popped.
//! The reaper deletes such entries once they are older than the configured
//! retention.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics;
use crate::queue::SharedQueue;

pub struct ResponseReaper {
    queue: Arc<dyn SharedQueue>,
    max_age: Duration,
    interval: Duration,
}

impl ResponseReaper {
    pub fn new(queue: Arc<dyn SharedQueue>, max_age: Duration, interval: Duration) -> Self {
        Self {
            queue,
            max_age,
            interval,
        }
    }

    /// Sweep until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            max_age_secs = self.max_age.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Response reaper starting"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; nothing can be stale yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Response reaper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one reclamation pass. Errors are logged, never fatal.
    pub async fn sweep(&self) -> usize {
        match self.queue.reclaim_abandoned(self.max_age).await {
            Ok(0) => 0,
            Ok(removed) => {
                tracing::info!(removed, "Reclaimed abandoned responses");
                metrics::record_reclaimed(removed);
                removed
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reclaim abandoned responses");
                0
            }
        }
    }
}
