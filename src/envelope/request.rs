//! Request envelope.

use serde::{Deserialize, Deserializer, Serialize};

use super::headers::Headers;

/// Generate a fresh correlation id.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Deserialize a correlation id, generating one when missing, null or empty.
pub(crate) fn correlation_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|id| !id.is_empty()).unwrap_or_else(new_correlation_id))
}

/// Every field a request can be built from. All optional.
#[derive(Debug, Clone, Default)]
pub struct RequestFields {
    pub method: Option<String>,
    pub uri: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub headers: Headers,
    pub body: Option<String>,
    pub uuid: Option<String>,
}

/// An inbound HTTP request, as handed from the dispatcher to a worker.
///
/// Wire form: `{method, uri, path, query, headers, body, uuid}`. The
/// correlation id is always populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    headers: Headers,
    #[serde(default)]
    body: Option<String>,
    #[serde(default = "new_correlation_id", deserialize_with = "correlation_id")]
    uuid: String,
}

impl Request {
    pub fn new(fields: RequestFields) -> Self {
        Self {
            method: fields.method,
            uri: fields.uri,
            path: fields.path,
            query: fields.query,
            headers: fields.headers,
            body: fields.body,
            uuid: fields
                .uuid
                .filter(|id| !id.is_empty())
                .unwrap_or_else(new_correlation_id),
        }
    }

    /// Return the request with `name` set to `value`.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
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

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl From<RequestFields> for Request {
    fn from(fields: RequestFields) -> Self {
        Self::new(fields)
    }
}
