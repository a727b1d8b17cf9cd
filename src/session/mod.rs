//! Recorded sessions handed to the analysis core

mod exchange;

pub use exchange::RecordedExchange;

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::LimitsConfig;
use crate::{ApiscopeError, Result};

/// Session id used when the recording carries none
pub const DEFAULT_SESSION: &str = "default";

/// An ordered capture of exchanges plus session metadata
///
/// Sessions are read-only once handed to the orchestrator; share them as
/// `Arc<RecordingSession>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    /// Session id
    #[serde(default)]
    pub id: String,
    /// Human readable name
    #[serde(default)]
    pub name: String,
    /// Capture start (Unix epoch milliseconds)
    #[serde(default, deserialize_with = "epoch_millis")]
    pub start_time: u64,
    /// Capture end (Unix epoch milliseconds)
    #[serde(default, deserialize_with = "optional_epoch_millis")]
    pub end_time: Option<u64>,
    /// Originating tab or context
    #[serde(default)]
    pub context: Option<String>,
    /// Captured exchanges in capture order
    #[serde(default)]
    pub requests: Vec<RecordedExchange>,
}

/// Millisecond timestamps as browsers record them
///
/// Fractional values are truncated. Negative, non-finite and non-numeric
/// values read as absent.
fn lenient_millis(value: &Value) -> Option<u64> {
    if let Some(millis) = value.as_u64() {
        return Some(millis);
    }
    let float = match value {
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        other => other.as_f64()?,
    };
    (float.is_finite() && float >= 0.0).then(|| float.trunc() as u64)
}

pub(crate) fn epoch_millis<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_millis(&Value::deserialize(deserializer)?).unwrap_or_default())
}

pub(crate) fn optional_epoch_millis<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_millis(&Value::deserialize(deserializer)?))
}

impl RecordingSession {
    /// Create an empty session
    #[must_use]
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Parse a session from JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a session document or exceeds limits
    pub fn from_json_str(text: &str, limits: &LimitsConfig) -> Result<Self> {
        let mut session: Self = serde_json::from_str(text)
            .map_err(|e| ApiscopeError::InvalidSession(format!("Failed to parse session: {e}")))?;

        if session.requests.len() > limits.max_exchanges {
            return Err(ApiscopeError::InvalidSession(format!(
                "Session has {} exchanges, limit is {}",
                session.requests.len(),
                limits.max_exchanges
            )));
        }

        session.normalize();
        Ok(session)
    }

    /// Load a session from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path, limits: &LimitsConfig) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let session = Self::from_json_str(&text, limits)?;
        debug!(
            "Loaded session '{}' from {} ({} exchanges)",
            session.id,
            path.display(),
            session.requests.len()
        );
        Ok(session)
    }

    /// Append an exchange (capture phase only)
    pub fn push(&mut self, mut exchange: RecordedExchange) {
        if exchange.id.is_empty() {
            exchange.id = self.requests.len().to_string();
        }
        self.requests.push(exchange);
    }

    /// Number of exchanges
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether the session has no exchanges
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Fill in missing ids and the end time
    fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = DEFAULT_SESSION.to_string();
        }
        for (index, exchange) in self.requests.iter_mut().enumerate() {
            if exchange.id.is_empty() {
                exchange.id = index.to_string();
            }
        }
        if self.end_time.is_none() {
            self.end_time = self.requests.iter().map(|r| r.timestamp).max();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SESSION: &str = r#"{
        "id": "s1",
        "name": "checkout flow",
        "startTime": 1000,
        "requests": [
            {"url": "https://shop.test/api/cart", "method": "GET", "timestamp": 1100, "duration": 20},
            {"id": "x", "url": "https://shop.test/api/cart", "method": "POST", "timestamp": 1500}
        ]
    }"#;

    #[test]
    fn test_parse_session() {
        let session = RecordingSession::from_json_str(SESSION, &LimitsConfig::default()).unwrap();
        assert_eq!(session.id, "s1");
        assert_eq!(session.len(), 2);
        assert_eq!(session.requests[0].id, "0");
        assert_eq!(session.requests[1].id, "x");
        assert_eq!(session.end_time, Some(1500));
    }

    #[test]
    fn test_session_limit() {
        let limits = LimitsConfig {
            max_exchanges: 1,
            ..LimitsConfig::default()
        };
        assert!(RecordingSession::from_json_str(SESSION, &limits).is_err());
    }

    #[test]
    fn test_malformed_session() {
        let result = RecordingSession::from_json_str("[1, 2]", &LimitsConfig::default());
        assert!(matches!(result, Err(ApiscopeError::InvalidSession(_))));
    }

    #[test]
    fn test_default_id_and_push() {
        let mut session =
            RecordingSession::from_json_str(r#"{"requests": []}"#, &LimitsConfig::default())
                .unwrap();
        assert_eq!(session.id, DEFAULT_SESSION);
        assert!(session.is_empty());

        session.push(RecordedExchange::new("GET", "/a"));
        assert_eq!(session.requests[0].id, "0");
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SESSION.as_bytes()).unwrap();
        let session = RecordingSession::from_file(file.path(), &LimitsConfig::default()).unwrap();
        assert_eq!(session.name, "checkout flow");
    }

    #[test]
    fn test_fractional_timestamps() {
        let text = r#"{
            "startTime": 1700000000000.5,
            "endTime": null,
            "requests": [
                {"url": "/a", "method": "GET", "timestamp": 1700000000123.456},
                {"url": "/b", "method": "GET", "timestamp": "1700000000200"},
                {"url": "/c", "method": "GET", "timestamp": -5}
            ]
        }"#;
        let session = RecordingSession::from_json_str(text, &LimitsConfig::default()).unwrap();
        assert_eq!(session.start_time, 1_700_000_000_000);
        assert_eq!(session.requests[0].timestamp, 1_700_000_000_123);
        assert_eq!(session.requests[1].timestamp, 1_700_000_000_200);
        assert_eq!(session.requests[2].timestamp, 0);
        assert_eq!(session.end_time, Some(1_700_000_000_200));
    }
}
