//! A single recorded network round-trip

use std::borrow::Cow;
use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Base used to resolve exchanges recorded with a bare path
const RELATIVE_BASE: &str = "http://relative.invalid";

/// Content type fragments treated as binary payloads
const BINARY_CONTENT_TYPES: &[&str] = &["protobuf", "grpc", "octet-stream"];

/// One captured request/response pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedExchange {
    /// Unique id within the session
    #[serde(default)]
    pub id: String,
    /// Full request URL (absolute, or a path starting with `/`)
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Response status code
    #[serde(default)]
    pub status: Option<u16>,
    /// Capture timestamp (Unix epoch milliseconds)
    #[serde(default, deserialize_with = "super::epoch_millis")]
    pub timestamp: u64,
    /// Round-trip duration in milliseconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Request headers
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,
    /// Response headers
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
    /// Request body (JSON value, JSON text, plain text or encoded binary)
    #[serde(default)]
    pub request_body: Option<Value>,
    /// Response body (JSON value, JSON text, plain text or encoded binary)
    #[serde(default)]
    pub response_body: Option<Value>,
    /// Declared response content type
    #[serde(default)]
    pub content_type: Option<String>,
}

impl RecordedExchange {
    /// Create an exchange with just a method and URL
    #[must_use]
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            ..Self::default()
        }
    }

    /// Parse the URL, resolving bare paths against a placeholder origin
    ///
    /// Returns `None` when the URL cannot be parsed.
    #[must_use]
    pub fn parsed_url(&self) -> Option<Url> {
        let trimmed = self.url.trim();
        if trimmed.starts_with('/') {
            Url::parse(RELATIVE_BASE).ok()?.join(trimmed).ok()
        } else {
            Url::parse(trimmed).ok()
        }
    }

    /// Origin (`scheme://host[:port]`) of an absolute URL
    #[must_use]
    pub fn origin(&self) -> Option<String> {
        if self.url.trim().starts_with('/') {
            return None;
        }
        let url = self.parsed_url()?;
        let origin = url.origin();
        origin.is_tuple().then(|| origin.ascii_serialization())
    }

    /// Upper-cased method
    #[must_use]
    pub fn method_upper(&self) -> String {
        self.method.trim().to_uppercase()
    }

    /// Positive, finite duration in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> Option<f64> {
        self.duration.filter(|d| d.is_finite() && *d > 0.0)
    }

    /// Request header value (case-insensitive name lookup)
    #[must_use]
    pub fn request_header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.request_headers, name)
    }

    /// Response header value (case-insensitive name lookup)
    #[must_use]
    pub fn response_header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.response_headers, name)
    }

    /// Declared content type, falling back to the response header
    #[must_use]
    pub fn response_content_type(&self) -> Option<&str> {
        self.content_type
            .as_deref()
            .or_else(|| self.response_header("content-type"))
    }

    /// Whether the response body is a binary wire payload
    #[must_use]
    pub fn has_binary_response(&self) -> bool {
        self.response_content_type()
            .is_some_and(is_binary_content_type)
    }

    /// Whether the request body is a binary wire payload
    #[must_use]
    pub fn has_binary_request(&self) -> bool {
        self.request_header("content-type")
            .is_some_and(is_binary_content_type)
    }

    /// Request body as JSON, or `None` when absent or malformed
    #[must_use]
    pub fn request_json(&self) -> Option<Cow<'_, Value>> {
        if self.has_binary_request() {
            return None;
        }
        body_json(self.request_body.as_ref())
    }

    /// Response body as JSON, or `None` when absent or malformed
    #[must_use]
    pub fn response_json(&self) -> Option<Cow<'_, Value>> {
        if self.has_binary_response() {
            return None;
        }
        body_json(self.response_body.as_ref())
    }

    /// Decoded bytes of a binary response body
    #[must_use]
    pub fn response_bytes(&self) -> Option<Vec<u8>> {
        if !self.has_binary_response() {
            return None;
        }
        body_bytes(self.response_body.as_ref()?)
    }

    /// Decoded bytes of a binary request body
    #[must_use]
    pub fn request_bytes(&self) -> Option<Vec<u8>> {
        if !self.has_binary_request() {
            return None;
        }
        body_bytes(self.request_body.as_ref()?)
    }

    /// Response body rendered as text (JSON values are serialized)
    #[must_use]
    pub fn response_text(&self) -> Option<String> {
        match self.response_body.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

fn header_lookup<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn is_binary_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    BINARY_CONTENT_TYPES.iter().any(|t| lower.contains(t))
}

/// Interpret a recorded body as JSON
///
/// Strings holding JSON text are parsed; anything unparseable is "no body".
fn body_json(body: Option<&Value>) -> Option<Cow<'_, Value>> {
    match body? {
        Value::Null => None,
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            serde_json::from_str(trimmed).ok().map(Cow::Owned)
        }
        other => Some(Cow::Borrowed(other)),
    }
}

/// Decode a binary body recorded as base64 (or hex) text, or a byte array
fn body_bytes(body: &Value) -> Option<Vec<u8>> {
    match body {
        Value::String(text) => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD
                .decode(compact.as_bytes())
                .ok()
                .or_else(|| hex::decode(&compact).ok())
        }
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect(),
        _ => None,
    }
}
