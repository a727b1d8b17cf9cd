//! Security check suggestions

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::{
    classify, sort_by_confidence, walk_fields, Category, FieldClass, Severity, Suggestion,
    SuggestionBuilder,
};
use crate::endpoint::{self, EndpointKey, SegmentKind};
use crate::session::RecordedExchange;

/// Substrings that should never appear in a serialized response body
const SENSITIVE_MARKERS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "private_key",
    "privatekey",
    "credit_card",
    "card_number",
];

/// Short markers, only matched as standalone words or keys
static WORD_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^a-z0-9])(ssn|cvv)(?:[^a-z0-9]|$)").unwrap());

/// Response headers expected on every response
const SECURITY_HEADERS: &[&str] = &[
    "strict-transport-security",
    "x-content-type-options",
    "content-security-policy",
    "x-frame-options",
];

/// Classic payloads for string inputs
const INJECTION_PAYLOADS: &[&str] = &[
    "' OR '1'='1",
    "<script>alert(1)</script>",
    "../../../etc/passwd",
    "${7*7}",
    "; cat /etc/passwd",
];

/// Flags security-relevant observations
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityBuilder;

impl SecurityBuilder {
    /// Create a builder
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SuggestionBuilder for SecurityBuilder {
    fn suggest(&self, exchange: &RecordedExchange) -> Vec<Suggestion> {
        let mut out = Vec::new();

        sensitive_data(exchange, &mut out);
        security_headers(exchange, &mut out);
        query_credentials(exchange, &mut out);
        injection(exchange, &mut out);
        if let Some(key) = EndpointKey::from_exchange(exchange) {
            enumeration(&key, exchange, &mut out);
        }

        sort_by_confidence(&mut out);
        out
    }
}

fn sensitive_data(exchange: &RecordedExchange, out: &mut Vec<Suggestion>) {
    // field-level hits first, they carry a usable path
    if let Some(body) = exchange.response_json() {
        for (path, name, value) in walk_fields(&body) {
            if classify(&name, Some(value)) == Some(FieldClass::Password) && !value.is_null() {
                out.push(Suggestion::new(
                    path.clone(),
                    Category::SensitiveData,
                    95,
                    Severity::Critical,
                    format!("Response exposes secret field {path}"),
                ));
            }
        }
    }

    let Some(text) = exchange.response_text() else {
        return;
    };
    let lower = text.to_ascii_lowercase();
    let mut hits: Vec<&str> = SENSITIVE_MARKERS
        .iter()
        .copied()
        .filter(|m| lower.contains(m))
        .collect();
    for captures in WORD_MARKERS.captures_iter(&lower) {
        if let Some(word) = captures.get(1) {
            if !hits.contains(&word.as_str()) {
                hits.push(word.as_str());
            }
        }
    }
    if !hits.is_empty() {
        out.push(
            Suggestion::new(
                "body",
                Category::SensitiveData,
                80,
                Severity::High,
                "Response body mentions sensitive data; assert it is not leaked",
            )
            .with_example(json!(hits)),
        );
    }
}

fn security_headers(exchange: &RecordedExchange, out: &mut Vec<Suggestion>) {
    // nothing to judge without captured headers
    if exchange.response_headers.is_empty() {
        return;
    }
    for header in SECURITY_HEADERS {
        if exchange.response_header(header).is_none() {
            out.push(Suggestion::new(
                *header,
                Category::SecurityHeader,
                60,
                Severity::Low,
                format!("Response is missing the {header} header"),
            ));
        }
    }
}

fn query_credentials(exchange: &RecordedExchange, out: &mut Vec<Suggestion>) {
    let Some(url) = exchange.parsed_url() else {
        return;
    };
    for (key, _) in url.query_pairs() {
        if matches!(
            classify(&key, None),
            Some(FieldClass::Password | FieldClass::Token)
        ) {
            out.push(Suggestion::new(
                key.to_string(),
                Category::Credentials,
                85,
                Severity::High,
                format!("Credential '{key}' is sent in the query string"),
            ));
        }
    }
}

fn injection(exchange: &RecordedExchange, out: &mut Vec<Suggestion>) {
    let Some(body) = exchange.request_json() else {
        return;
    };
    for (path, _, value) in walk_fields(&body) {
        if value.is_string() {
            out.push(
                Suggestion::new(
                    path.clone(),
                    Category::Injection,
                    70,
                    Severity::Medium,
                    format!("Exercise {path} with injection payloads"),
                )
                .with_example(json!(INJECTION_PAYLOADS)),
            );
        }
    }
}

fn enumeration(key: &EndpointKey, exchange: &RecordedExchange, out: &mut Vec<Suggestion>) {
    let Some(url) = exchange.parsed_url() else {
        return;
    };
    for param in endpoint::path_parameters(url.path()) {
        let neighbour = match param.kind {
            SegmentKind::Integer => param
                .sample
                .parse::<u64>()
                .map_or(Value::Null, |n| json!(n.saturating_add(1))),
            SegmentKind::Uuid | SegmentKind::ObjectId => Value::Null,
        };
        let mut suggestion = Suggestion::new(
            format!("{{{}}}", param.name),
            Category::Enumeration,
            75,
            Severity::Medium,
            format!(
                "Request {} with another caller's {} and expect 403/404",
                key, param.name
            ),
        );
        if !neighbour.is_null() {
            suggestion.example = Some(neighbour);
        }
        out.push(suggestion);
    }
}
