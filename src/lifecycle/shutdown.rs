//! Shutdown coordination.

use tokio::sync::broadcast;

/// Fans one shutdown event out to every long-running task.
///
/// The HTTP server and the response reaper each hold a receiver; the worker
/// pool is stopped explicitly through `WorkerPoolSupervisor::stop`.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify every current subscriber. Later subscribers see nothing.
    pub fn trigger(&self) {
        let notified = self.tx.send(()).unwrap_or(0);
        tracing::debug!(notified, "Shutdown triggered");
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
