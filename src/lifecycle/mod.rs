//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config (validated) → Metrics → Shared queue → Reaper → Server and/or pool
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain pool → Stop reaper → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: queue first, then listeners
//! - Ordered shutdown: stop accept, drain in-flight fetches, close

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, RunMode, StartupError};
