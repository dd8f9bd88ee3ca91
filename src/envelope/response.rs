//! Response envelope.

use serde::{Deserialize, Serialize};

use super::headers::Headers;
use super::request::{correlation_id, new_correlation_id, Request};

/// Status line used when a response carries none.
pub const DEFAULT_STATUS: &str = "200 OK";

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

/// An upstream response, published by a worker for the dispatcher.
///
/// Wire form: `{status, headers, body, uuid, method, uri, path, query}`.
/// Request-side fields are echoed from the originating request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "default_status")]
    status: String,
    #[serde(default)]
    headers: Headers,
    #[serde(default)]
    body: Option<String>,
    #[serde(default = "new_correlation_id", deserialize_with = "correlation_id")]
    uuid: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    query: Option<String>,
}

impl Response {
    /// Build the response correlated with `request`.
    pub fn for_request(
        request: &Request,
        status: impl Into<String>,
        headers: Headers,
        body: impl Into<String>,
    ) -> Self {
        Self {
            status: status.into(),
            headers,
            body: Some(body.into()),
            uuid: request.uuid().to_string(),
            method: request.method().map(str::to_string),
            uri: request.uri().map(str::to_string),
            path: request.path().map(str::to_string),
            query: request.query().map(str::to_string),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Full status line, e.g. "404 Not Found".
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Numeric code parsed from the status line.
    pub fn status_code(&self) -> Option<u16> {
        self.status
            .split_whitespace()
            .next()
            .and_then(|code| code.parse().ok())
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
