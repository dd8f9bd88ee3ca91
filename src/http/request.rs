//! Inbound request conversion.
//!
//! # Responsibilities
//! - Turn the axum request head and buffered body into a `Request` envelope
//! - Keep every inbound header; repeated names are joined with ", "
//!
//! # Design Decisions
//! - The body travels as text: non-UTF-8 bytes are replaced, an empty body
//!   becomes `None`
//! - `uri` is the origin-form path and query as received

use axum::body::Bytes;
use axum::http::request::Parts;

use crate::envelope::{Headers, Request, RequestFields};

/// Build the envelope for an inbound request.
pub fn into_envelope(parts: &Parts, body: &Bytes) -> Request {
    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let mut headers = Headers::new();
    for (name, value) in parts.headers.iter() {
        headers.append(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
    }

    let body = (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned());

    Request::new(RequestFields {
        method: Some(parts.method.as_str().to_string()),
        uri: Some(uri),
        path: Some(parts.uri.path().to_string()),
        query: parts.uri.query().map(str::to_string),
        headers,
        body,
        uuid: None,
    })
}
