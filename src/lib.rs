//! HTTP proxy that relays requests through a shared queue to a pool of
//! one-shot fetch workers.

pub mod config;
pub mod envelope;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod queue;

pub use config::schema::ProxyConfig;
pub use envelope::{Request, Response};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pool::WorkerPoolSupervisor;
pub use queue::SharedQueue;
