//! Response rendering.
//!
//! # Responsibilities
//! - Turn a stored `Response` envelope into the HTTP reply for the client
//! - Produce the fixed replies for timeouts and dispatch failures
//!
//! # Design Decisions
//! - Hop-by-hop headers are stripped; the body is re-framed with a
//!   recomputed `Content-Length`
//! - `Content-Encoding` is always `identity`: workers store decoded text
//! - A status line without a valid numeric code is answered with 502

use axum::body::Body;
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};

use crate::envelope::{is_hop_by_hop, Response};

/// Body sent with every 504.
pub const FALLBACK_BODY: &str = "Something went wrong";

/// Value forced onto `Content-Encoding`.
pub const CONTENT_ENCODING_VALUE: &str = "identity";

fn reframed(name: &str) -> bool {
    is_hop_by_hop(name)
        || name.eq_ignore_ascii_case("content-length")
        || name.eq_ignore_ascii_case("content-encoding")
}

/// Render a stored response.
pub fn render(response: &Response) -> HttpResponse {
    let Some(status) = response
        .status_code()
        .and_then(|code| StatusCode::from_u16(code).ok())
    else {
        tracing::warn!(
            uuid = %response.uuid(),
            status = %response.status(),
            "Stored response has an invalid status line"
        );
        return bad_gateway();
    };

    let body = response.body().to_string();
    let content_length = body.len();

    let mut reply = HttpResponse::new(Body::from(body));
    *reply.status_mut() = status;

    let headers = reply.headers_mut();
    for (name, value) in response.headers().iter().filter(|(name, _)| !reframed(name)) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!(header = %name, "Dropping unrepresentable header"),
        }
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
    headers.insert(
        CONTENT_ENCODING,
        HeaderValue::from_static(CONTENT_ENCODING_VALUE),
    );

    reply
}

/// 504 with no headers and the fixed fallback body.
pub fn gateway_timeout() -> HttpResponse {
    let mut reply = HttpResponse::new(Body::from(FALLBACK_BODY));
    *reply.status_mut() = StatusCode::GATEWAY_TIMEOUT;
    reply
}

pub fn bad_gateway() -> HttpResponse {
    (StatusCode::BAD_GATEWAY, "Invalid upstream response").into_response()
}

pub fn service_unavailable() -> HttpResponse {
    (StatusCode::SERVICE_UNAVAILABLE, "Queue unavailable").into_response()
}
