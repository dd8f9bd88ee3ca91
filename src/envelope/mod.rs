//! Request/response envelopes exchanged through the shared queue.
//!
//! # Data Flow
//! ```text
//! inbound HTTP request
//!     → Request (uuid generated here)
//!     → to_json → shared queue → from_json (worker)
//!     → outbound fetch
//!     → Response::for_request (same uuid)
//!     → to_json → shared queue → from_json (dispatcher)
//! ```
//!
//! # Design Decisions
//! - Envelopes expose no `&mut` accessors; a request is fixed once pushed
//! - Header names are title-cased on write
//! - The correlation id survives every hop verbatim

pub mod headers;
pub mod request;
pub mod response;

pub use headers::{is_hop_by_hop, title_case, Headers};
pub use request::{new_correlation_id, Request, RequestFields};
pub use response::Response;
