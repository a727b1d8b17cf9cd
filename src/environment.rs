//! Environment extraction for generated tests
//!
//! Collects what a generated suite needs to run against another deployment:
//! base URLs, credentials lifted into variables, and headers every request
//! carries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointKey;
use crate::heuristics::{classify, FieldClass};
use crate::session::RecordingSession;

/// Headers never treated as common
const VOLATILE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "content-length",
    "host",
    "date",
    "if-none-match",
    "if-modified-since",
    "x-request-id",
    "x-correlation-id",
    "traceparent",
    "tracestate",
];

const AUTH_PATH_MARKERS: &[&str] = &["login", "signin", "auth", "token", "session"];

/// Variable lifted out of recorded traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVariable {
    /// Variable name (`BASE_URL`, `AUTH_TOKEN`, ...)
    pub name: String,
    /// Observed value
    pub value: String,
    /// Must not be written to logs or committed files
    pub sensitive: bool,
    /// Where the value was found
    pub source: String,
}

impl EnvVariable {
    /// Value safe for display
    #[must_use]
    pub fn display_value(&self) -> String {
        if !self.sensitive {
            return self.value.clone();
        }
        let tail: String = self
            .value
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if self.value.chars().count() <= 8 {
            "****".to_string()
        } else {
            format!("****{tail}")
        }
    }
}

/// Environment a generated suite needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentProfile {
    /// Origins, most frequent first
    pub base_urls: Vec<String>,
    /// Extracted variables
    pub variables: Vec<EnvVariable>,
    /// Lower-cased header names with the value every request sent
    pub common_headers: BTreeMap<String, String>,
}

impl EnvironmentProfile {
    /// Variable by name
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&EnvVariable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

fn is_api_key_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("api") && lower.contains("key")
}

/// Extract the environment of a session
#[must_use]
pub fn extract(session: &RecordingSession) -> EnvironmentProfile {
    let mut profile = EnvironmentProfile {
        base_urls: base_urls(session),
        ..EnvironmentProfile::default()
    };

    if let Some(base) = profile.base_urls.first() {
        profile.variables.push(EnvVariable {
            name: "BASE_URL".to_string(),
            value: base.clone(),
            sensitive: false,
            source: "most frequent origin".to_string(),
        });
    }

    let bearer = session.requests.iter().find_map(|e| {
        let auth = e.request_header("authorization")?.trim();
        let (scheme, token) = auth.split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| (e.id.clone(), token.trim().to_string()))
    });
    if let Some((id, token)) = bearer {
        profile.variables.push(EnvVariable {
            name: "AUTH_TOKEN".to_string(),
            value: token,
            sensitive: true,
            source: format!("Authorization header of exchange {id}"),
        });
    }

    let api_key = session.requests.iter().find_map(|e| {
        e.request_headers
            .iter()
            .find(|(name, _)| is_api_key_header(name))
            .map(|(name, value)| (name.clone(), value.clone()))
    });
    if let Some((header, value)) = api_key {
        profile.variables.push(EnvVariable {
            name: "API_KEY".to_string(),
            value,
            sensitive: true,
            source: format!("{header} header"),
        });
    }

    if let Some((source, token)) = session_token(session) {
        profile.variables.push(EnvVariable {
            name: "SESSION_TOKEN".to_string(),
            value: token,
            sensitive: true,
            source,
        });
    }

    profile.common_headers = common_headers(session);
    profile
}

fn base_urls(session: &RecordingSession) -> Vec<String> {
    // (count, first seen index)
    let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for (index, origin) in session.requests.iter().filter_map(|e| e.origin()).enumerate() {
        counts.entry(origin).or_insert((0, index)).0 += 1;
    }

    let mut origins: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    origins.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    origins.into_iter().map(|(origin, _)| origin).collect()
}

/// First token-like string field in a response from an auth-like endpoint
fn session_token(session: &RecordingSession) -> Option<(String, String)> {
    session.requests.iter().find_map(|exchange| {
        let key = EndpointKey::from_exchange(exchange)?;
        let path = key.template.to_ascii_lowercase();
        if !AUTH_PATH_MARKERS.iter().any(|m| path.contains(m)) {
            return None;
        }
        let body = exchange.response_json()?;
        let map = body.as_object()?;
        map.iter().find_map(|(name, value)| {
            let text = value.as_str()?;
            (classify(name, Some(value)) == Some(FieldClass::Token) && !text.is_empty()).then(|| {
                (
                    format!("{name} field of {key} response"),
                    text.to_string(),
                )
            })
        })
    })
}

fn common_headers(session: &RecordingSession) -> BTreeMap<String, String> {
    let mut requests = session.requests.iter();
    let Some(first) = requests.next() else {
        return BTreeMap::new();
    };

    let mut common: BTreeMap<String, String> = first
        .request_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .filter(|(name, _)| !VOLATILE_HEADERS.contains(&name.as_str()) && !is_api_key_header(name))
        .collect();

    for exchange in requests {
        common.retain(|name, value| exchange.request_header(name) == Some(value.as_str()));
    }

    common
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RecordedExchange;
    use serde_json::json;

    fn request(url: &str, headers: &[(&str, &str)]) -> RecordedExchange {
        let mut e = RecordedExchange::new("GET", url);
        for (k, v) in headers {
            e.request_headers.insert((*k).to_string(), (*v).to_string());
        }
        e
    }

    #[test]
    fn test_extract_environment() {
        let mut login = request(
            "https://auth.test/api/login",
            &[("Accept", "application/json"), ("X-Client", "web")],
        );
        login.method = "POST".to_string();
        login.response_body = Some(json!({"sessionToken": "s-123", "user": "ann"}));

        let session = RecordingSession {
            requests: vec![
                login,
                request(
                    "https://api.test/items",
                    &[
                        ("accept", "application/json"),
                        ("Authorization", "Bearer abc.def.ghi"),
                        ("X-Client", "web"),
                        ("X-Request-Id", "1"),
                    ],
                ),
                request(
                    "https://api.test/items/2",
                    &[
                        ("Accept", "application/json"),
                        ("X-Api-Key", "key-1"),
                        ("X-Client", "mobile"),
                    ],
                ),
            ],
            ..RecordingSession::default()
        };

        let env = extract(&session);
        assert_eq!(env.base_urls, vec!["https://api.test", "https://auth.test"]);
        assert_eq!(env.variable("BASE_URL").unwrap().value, "https://api.test");
        assert_eq!(env.variable("AUTH_TOKEN").unwrap().value, "abc.def.ghi");
        assert!(env.variable("AUTH_TOKEN").unwrap().sensitive);
        assert_eq!(env.variable("API_KEY").unwrap().value, "key-1");
        assert_eq!(env.variable("SESSION_TOKEN").unwrap().value, "s-123");

        // X-Client differs on the last request
        assert_eq!(env.common_headers.len(), 1);
        assert_eq!(env.common_headers["accept"], "application/json");
    }

    #[test]
    fn test_empty_session() {
        let env = extract(&RecordingSession::default());
        assert!(env.base_urls.is_empty());
        assert!(env.variables.is_empty());
        assert!(env.common_headers.is_empty());
    }

    #[test]
    fn test_display_value_masks_secrets() {
        let var = EnvVariable {
            name: "AUTH_TOKEN".to_string(),
            value: "abcdefghijkl".to_string(),
            sensitive: true,
            source: String::new(),
        };
        assert_eq!(var.display_value(), "****ijkl");
        let short = EnvVariable {
            value: "abc".to_string(),
            ..var.clone()
        };
        assert_eq!(short.display_value(), "****");
        let plain = EnvVariable {
            sensitive: false,
            ..var
        };
        assert_eq!(plain.display_value(), "abcdefghijkl");
    }
}
