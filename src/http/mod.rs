//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, body limit)
//!     → request.rs (axum request → Request envelope)
//!     → dispatch.rs (push, poll for the correlated response)
//!     → response.rs (render stored response, or 504 on timeout)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;

pub use dispatch::{DispatchError, DispatchOutcome, Dispatcher};
pub use server::HttpServer;
