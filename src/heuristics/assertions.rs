//! Assertion suggestions for generated tests

use chrono::{DateTime, FixedOffset};
use serde_json::{json, Value};

use super::{
    classify_field, sort_by_confidence, walk_fields, Category, FieldClass, Severity, Suggestion,
    SuggestionBuilder,
};
use crate::endpoint::EndpointKey;
use crate::session::RecordedExchange;

const AUTH_PATH_MARKERS: &[&str] = &["login", "signin", "sign-in", "auth", "token", "session"];

/// Proposes assertions from an exchange's observed response
#[derive(Debug, Clone, Copy, Default)]
pub struct AssertionBuilder;

impl AssertionBuilder {
    /// Create a builder
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SuggestionBuilder for AssertionBuilder {
    fn suggest(&self, exchange: &RecordedExchange) -> Vec<Suggestion> {
        let mut out = Vec::new();

        if let Some(status) = exchange.status {
            out.push(
                Suggestion::new(
                    "status",
                    Category::Status,
                    95,
                    Severity::High,
                    format!("Expect status {status}"),
                )
                .with_example(json!(status)),
            );
        }

        if let Some(content_type) = exchange.response_content_type() {
            let media = content_type.split(';').next().unwrap_or_default().trim();
            out.push(
                Suggestion::new(
                    "content-type",
                    Category::ContentType,
                    90,
                    Severity::Medium,
                    format!("Expect content type {media}"),
                )
                .with_example(json!(media)),
            );
        }

        let key = EndpointKey::from_exchange(exchange);
        if let Some(body) = exchange.response_json() {
            if let Some(key) = &key {
                auth_token(key, &body, &mut out);
                collection(key, exchange, &body, &mut out);
            }
            temporal_order(&body, &mut out);
            field_assertions(&body, &mut out);
        }

        sort_by_confidence(&mut out);
        out
    }
}

fn is_auth_path(key: &EndpointKey) -> bool {
    let path = key.template.to_ascii_lowercase();
    AUTH_PATH_MARKERS.iter().any(|m| path.contains(m))
}

/// Auth-like endpoints should hand back a token
fn auth_token(key: &EndpointKey, body: &Value, out: &mut Vec<Suggestion>) {
    if !is_auth_path(key) {
        return;
    }
    for (path, name, value) in walk_fields(body) {
        let is_token = classify_field(&name, Some(value))
            .is_some_and(|rule| rule.class == FieldClass::Token);
        if is_token && value.is_string() {
            out.push(Suggestion::new(
                path,
                Category::Auth,
                90,
                Severity::High,
                "Response should contain a non-empty auth token",
            ));
            return;
        }
    }
}

/// Plural GET endpoints should return a list
fn collection(key: &EndpointKey, exchange: &RecordedExchange, body: &Value, out: &mut Vec<Suggestion>) {
    if exchange.method_upper() != "GET" {
        return;
    }
    let last = key.template.rsplit('/').next().unwrap_or_default();
    if last.starts_with('{') || !last.ends_with('s') {
        return;
    }

    let list = match body {
        Value::Array(items) => Some(("$", items.len())),
        Value::Object(map) => ["data", "items", "results"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array).map(|a| (*k, a.len()))),
        _ => None,
    };

    if let Some((field, len)) = list {
        out.push(
            Suggestion::new(
                field,
                Category::Collection,
                80,
                Severity::Medium,
                "Expect the response to be a list",
            )
            .with_example(json!({"observedLength": len})),
        );
    }
}

fn parse_time(value: &Value) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.as_str()?).ok()
}

/// `created*` must not be later than `updated*`
fn temporal_order(body: &Value, out: &mut Vec<Suggestion>) {
    let target = match body {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let Some(Value::Object(map)) = target else {
        return;
    };

    let find = |prefix: &str| {
        map.iter()
            .find(|(k, _)| k.to_ascii_lowercase().starts_with(prefix))
            .and_then(|(k, v)| parse_time(v).map(|t| (k.clone(), t)))
    };

    if let (Some((created, c)), Some((updated, u))) = (find("created"), find("updated")) {
        if c <= u {
            out.push(Suggestion::new(
                format!("{created},{updated}"),
                Category::Temporal,
                75,
                Severity::Medium,
                format!("{created} should not be after {updated}"),
            ));
        }
    }
}

/// Per-field presence and format assertions from the rule table
fn field_assertions(body: &Value, out: &mut Vec<Suggestion>) {
    for (path, name, value) in walk_fields(body) {
        if value.is_null() || value.is_object() || value.is_array() {
            continue;
        }
        let Some(rule) = classify_field(&name, Some(value)) else {
            continue;
        };

        let description = match rule.class {
            // never assert on secret values
            FieldClass::Password => continue,
            FieldClass::Token => "should be a non-empty string".to_string(),
            FieldClass::Email => "should be a valid email address".to_string(),
            FieldClass::Phone => "should be a valid phone number".to_string(),
            FieldClass::Url => "should be an absolute URL".to_string(),
            FieldClass::Timestamp => "should be an ISO 8601 timestamp".to_string(),
            FieldClass::Currency => "should be a non-negative number".to_string(),
            FieldClass::Identifier => "should be present and stable".to_string(),
            FieldClass::Quantity => "should be a non-negative integer".to_string(),
            FieldClass::Status => format!("should be one of the known states (saw {value})"),
            FieldClass::Name => "should be a non-empty string".to_string(),
        };

        let severity = match rule.class {
            FieldClass::Identifier | FieldClass::Token => Severity::High,
            FieldClass::Name | FieldClass::Status => Severity::Low,
            _ => Severity::Medium,
        };

        let example = match rule.class {
            FieldClass::Token => None,
            _ => Some(value.clone()),
        };

        let mut suggestion = Suggestion::new(
            path.clone(),
            Category::Field,
            rule.confidence,
            severity,
            format!("{path} {description}"),
        );
        suggestion.example = example;
        out.push(suggestion);
    }
}
