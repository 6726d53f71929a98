//! Captured exchange model
//!
//! Represents a single logical HTTP request/response pair observed inside a
//! client library.

use crate::models::HeaderList;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text rendered for bodies that could not be snapshotted, decompressed or
/// decoded, or that exceed the capture limit.
pub const OPAQUE_BODY_SENTINEL: &str = "<non-text or too large>";

/// Marker rendered for absent values.
pub const NONE_MARKER: &str = "<none>";

/// A materialized body as it appears in a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum CapturedBody {
    /// No body was present on the message
    #[default]
    None,
    /// Body decoded as UTF-8 text
    Text(String),
    /// Body present but not inspectable
    Opaque,
}

impl CapturedBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CapturedBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for CapturedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturedBody::None => f.write_str(NONE_MARKER),
            CapturedBody::Text(text) => f.write_str(text),
            CapturedBody::Opaque => f.write_str(OPAQUE_BODY_SENTINEL),
        }
    }
}

/// Which point of an exchange a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Outgoing request, before forwarding
    Request,
    /// Completed response
    Response,
    /// Stepwise `connect()` reached
    Connect,
    /// Stepwise `input_stream()` reached
    InputStream,
}

impl Phase {
    /// Whether the record carries a status line instead of a request line.
    pub fn is_response(&self) -> bool {
        matches!(self, Phase::Response)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Request => "Request",
            Phase::Response => "Response",
            Phase::Connect => "connect()",
            Phase::InputStream => "input_stream()",
        }
    }
}

/// One logical request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedExchange {
    /// Unique identifier for this exchange
    pub id: String,
    /// Client library label (e.g. "HttpClient")
    pub library: String,
    pub method: String,
    /// Fully resolved URL
    pub url: String,
    pub request_headers: HeaderList,
    pub request_body: CapturedBody,

    pub status_code: Option<u16>,
    pub status_message: Option<String>,
    pub response_headers: HeaderList,
    pub response_body: CapturedBody,

    /// Wall-clock time the exchange was first observed
    pub started_at: DateTime<Utc>,
    /// Time spent in the forwarded call, when it completed
    pub duration_ms: Option<f64>,
}

impl CapturedExchange {
    pub fn new(library: &str, method: &str, url: &str, request_headers: HeaderList) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            library: library.to_string(),
            method: method.to_string(),
            url: url.to_string(),
            request_headers,
            request_body: CapturedBody::None,
            status_code: None,
            status_message: None,
            response_headers: HeaderList::new(),
            response_body: CapturedBody::None,
            started_at: Utc::now(),
            duration_ms: None,
        }
    }

    /// Duration formatted with one decimal place, or "none".
    pub fn duration_str(&self) -> String {
        match self.duration_ms {
            Some(ms) => format!("{:.1}", ms),
            None => "none".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_display_uses_markers() {
        assert_eq!(CapturedBody::None.to_string(), "<none>");
        assert_eq!(CapturedBody::Opaque.to_string(), OPAQUE_BODY_SENTINEL);
        assert_eq!(CapturedBody::Text("{}".into()).to_string(), "{}");
    }

    #[test]
    fn new_exchange_has_unique_id_and_no_response() {
        let a = CapturedExchange::new("HttpClient", "GET", "http://a", HeaderList::new());
        let b = CapturedExchange::new("HttpClient", "GET", "http://a", HeaderList::new());
        assert_ne!(a.id, b.id);
        assert!(a.status_code.is_none());
        assert_eq!(a.duration_str(), "none");
    }
}
