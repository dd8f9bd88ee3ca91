//! Self-replenishing pool of one-shot fetch workers.
//!
//! # Data Flow
//! ```text
//! Shared queue ──get_request()──▶ task feed ──▶ LocalBuffer (capacity = K)
//!                                                   │
//!                     maintenance loop keeps K ──▶ FetchWorker ×K
//!                                                   │ fetch upstream
//! Shared queue ◀──set_response()────────────────────┘
//! ```
//!
//! # Lifecycle
//! `Idle → Running → Draining → Stopped`. Stopping sets a shared flag: the
//! feed stops claiming, the maintenance loop stops spawning, idle workers
//! exit and in-flight fetches finish before `stop` returns.
//!
//! Losing the backing store in the feed loop is fatal to the pool and is
//! reported by `stop`.

pub mod buffer;
pub mod supervisor;
pub mod worker;

use thiserror::Error;

use crate::queue::QueueError;

pub use self::buffer::LocalBuffer;
pub use self::supervisor::WorkerPoolSupervisor;
pub use self::worker::{FetchError, FetchWorker, Fetcher, HttpFetcher, WorkerError, WorkerOutcome};

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Pool is already running")]
    AlreadyRunning,

    #[error("Pool is not running")]
    NotRunning,

    /// The task feed lost the shared queue.
    #[error("Shared queue failed: {0}")]
    Queue(#[from] QueueError),

    /// A pool loop panicked.
    #[error("Pool task panicked: {0}")]
    TaskPanicked(String),
}

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl From<u8> for PoolState {
    fn from(val: u8) -> Self {
        match val {
            1 => PoolState::Running,
            2 => PoolState::Draining,
            3 => PoolState::Stopped,
            _ => PoolState::Idle,
        }
    }
}

/// Point-in-time snapshot of pool activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured worker count (K).
    pub target_workers: usize,
    /// Workers alive at the last maintenance pass.
    pub live_workers: usize,
    /// Requests claimed but not yet taken by a worker.
    pub buffered: usize,
    /// Workers started since the pool began.
    pub spawned: u64,
    /// Workers that published a response.
    pub completed: u64,
    /// Workers that ended with an error or panicked.
    pub failed: u64,
    /// Workers that exited at shutdown without a request.
    pub idle_exits: u64,
}

impl PoolStats {
    /// Workers that have ended, for any reason.
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.idle_exits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_state_from_u8() {
        assert_eq!(PoolState::from(0), PoolState::Idle);
        assert_eq!(PoolState::from(1), PoolState::Running);
        assert_eq!(PoolState::from(2), PoolState::Draining);
        assert_eq!(PoolState::from(3), PoolState::Stopped);
        assert_eq!(PoolState::from(42), PoolState::Idle);
    }

    #[test]
    fn test_pool_stats_finished() {
        let stats = PoolStats {
            completed: 3,
            failed: 2,
            idle_exits: 1,
            ..Default::default()
        };
        assert_eq!(stats.finished(), 6);
    }
}
