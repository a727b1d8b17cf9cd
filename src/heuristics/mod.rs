//! Heuristic suggestion engines
//!
//! Three builders share one ordered field-classification table:
//! [`AssertionBuilder`] proposes test assertions, [`SecurityBuilder`] flags
//! security checks and [`VariationBuilder`] proposes input variations.

mod assertions;
mod rules;
mod security;
mod variations;

pub use assertions::AssertionBuilder;
pub use rules::{classify, classify_field, FieldClass, FieldRule, FIELD_RULES};
pub use security::SecurityBuilder;
pub use variations::VariationBuilder;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::endpoint::{self, EndpointKey};
use crate::session::RecordedExchange;

/// Deepest field path followed when walking bodies
pub const MAX_FIELD_DEPTH: usize = 6;

/// What a suggestion is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Response status code
    Status,
    /// Response content type
    ContentType,
    /// Field presence or format
    Field,
    /// Authentication flow
    Auth,
    /// List responses
    Collection,
    /// Ordering of timestamps
    Temporal,
    /// Sensitive data exposure
    SensitiveData,
    /// Missing security response header
    SecurityHeader,
    /// Credentials outside the body
    Credentials,
    /// Injection payload probing
    Injection,
    /// Identifier enumeration
    Enumeration,
    /// Boundary or malformed input
    Variation,
    /// Omitted required input
    MissingField,
}

/// How much a suggestion matters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Info,
    /// Low
    Low,
    /// Medium
    Medium,
    /// High
    High,
    /// Critical
    Critical,
}

/// One heuristic suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Field path, header name or pseudo-field (`status`)
    pub field: String,
    /// Category
    pub category: Category,
    /// Static confidence of the rule that fired, 0 to 100
    pub confidence: u8,
    /// Severity
    pub severity: Severity,
    /// Human readable description
    pub description: String,
    /// Example value or payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

impl Suggestion {
    /// Create a suggestion without an example
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        category: Category,
        confidence: u8,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            category,
            confidence,
            severity,
            description: description.into(),
            example: None,
        }
    }

    /// Attach an example
    #[must_use]
    pub fn with_example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }
}

/// Stable sort by descending confidence
pub fn sort_by_confidence(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|a, b| b.confidence.cmp(&a.confidence));
}

/// A rule engine producing suggestions for one exchange
pub trait SuggestionBuilder: Send + Sync {
    /// Suggestions for one exchange, sorted by descending confidence
    fn suggest(&self, exchange: &RecordedExchange) -> Vec<Suggestion>;

    /// Suggestions per endpoint over a list of exchanges
    ///
    /// Duplicates (same field, category and description) are dropped,
    /// keeping the first occurrence.
    fn suggest_all(&self, exchanges: &[RecordedExchange]) -> BTreeMap<EndpointKey, Vec<Suggestion>> {
        endpoint::group_exchanges(exchanges)
            .into_iter()
            .filter_map(|(key, group)| {
                let mut seen = BTreeSet::new();
                let mut merged: Vec<Suggestion> = group
                    .iter()
                    .flat_map(|exchange| self.suggest(exchange))
                    .filter(|s| seen.insert((s.field.clone(), s.category, s.description.clone())))
                    .collect();
                sort_by_confidence(&mut merged);
                (!merged.is_empty()).then_some((key, merged))
            })
            .collect()
    }
}

/// Leaf and container fields of a body as `(dotted path, name, value)`
///
/// Arrays contribute their first element under `path[]`.
pub(crate) fn walk_fields(value: &Value) -> Vec<(String, String, &Value)> {
    let mut out = Vec::new();
    walk_into(value, "", 0, &mut out);
    out
}

fn walk_into<'a>(value: &'a Value, path: &str, depth: usize, out: &mut Vec<(String, String, &'a Value)>) {
    if depth >= MAX_FIELD_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (name, child) in map {
                let child_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}.{name}")
                };
                out.push((child_path.clone(), name.clone(), child));
                walk_into(child, &child_path, depth + 1, out);
            }
        }
        Value::Array(items) => {
            if let Some(first) = items.first() {
                walk_into(first, &format!("{path}[]"), depth + 1, out);
            }
        }
        _ => {}
    }
}
