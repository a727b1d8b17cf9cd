//! Input data variations for negative and boundary tests

use serde_json::{json, Value};

use super::{
    classify, sort_by_confidence, walk_fields, Category, FieldClass, Severity, Suggestion,
    SuggestionBuilder,
};
use crate::session::RecordedExchange;

/// Length used for oversized string variations
pub const LONG_STRING_LEN: usize = 256;

/// Proposes variations of observed request inputs
#[derive(Debug, Clone, Copy, Default)]
pub struct VariationBuilder;

impl VariationBuilder {
    /// Create a builder
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SuggestionBuilder for VariationBuilder {
    fn suggest(&self, exchange: &RecordedExchange) -> Vec<Suggestion> {
        let mut out = Vec::new();

        if let Some(body) = exchange.request_json() {
            for (path, name, value) in walk_fields(&body) {
                let class = classify(&name, Some(value));
                if let Some(variants) = variants_for(class, value) {
                    out.push(
                        Suggestion::new(
                            path.clone(),
                            Category::Variation,
                            if class.is_some() { 70 } else { 50 },
                            Severity::Info,
                            format!("Try boundary and malformed values for {path}"),
                        )
                        .with_example(Value::Array(variants)),
                    );
                }
                // only top-level fields can be dropped independently
                if !path.contains('.') && !path.contains('[') && !value.is_null() {
                    out.push(Suggestion::new(
                        path.clone(),
                        Category::MissingField,
                        60,
                        Severity::Low,
                        format!("Omit {path} and expect a validation error"),
                    ));
                }
            }
        }

        if let Some(url) = exchange.parsed_url() {
            for (key, value) in url.query_pairs() {
                let as_value = Value::String(value.into_owned());
                let class = classify(&key, Some(&as_value));
                if let Some(variants) = variants_for(class, &as_value) {
                    out.push(
                        Suggestion::new(
                            format!("?{key}"),
                            Category::Variation,
                            55,
                            Severity::Info,
                            format!("Try unexpected values for query parameter {key}"),
                        )
                        .with_example(Value::Array(variants)),
                    );
                }
            }
        }

        sort_by_confidence(&mut out);
        out
    }
}

fn long_string() -> Value {
    json!("a".repeat(LONG_STRING_LEN))
}

/// Variation values for a field; `None` for containers and nulls
fn variants_for(class: Option<FieldClass>, value: &Value) -> Option<Vec<Value>> {
    let by_class = class.and_then(|class| {
        let values = match class {
            FieldClass::Email => vec![
                json!(""),
                json!("not-an-email"),
                json!("user@"),
                json!("@example.com"),
                long_string(),
            ],
            FieldClass::Phone => vec![json!(""), json!("123"), json!("+0000000000000000")],
            FieldClass::Url => vec![json!(""), json!("not a url"), json!("javascript:alert(1)")],
            FieldClass::Timestamp => vec![
                json!(""),
                json!("not-a-date"),
                json!("1970-01-01T00:00:00Z"),
                json!("9999-12-31T23:59:59Z"),
            ],
            FieldClass::Currency => vec![json!(0), json!(-1), json!(0.001), json!(1e12)],
            FieldClass::Quantity => vec![json!(0), json!(-1), json!(i64::from(i32::MAX) + 1)],
            FieldClass::Identifier => vec![
                json!(0),
                json!(-1),
                json!("00000000-0000-0000-0000-000000000000"),
            ],
            FieldClass::Password => vec![json!(""), json!("short"), long_string()],
            FieldClass::Name => vec![json!(""), json!(" "), json!("名前 ✓"), long_string()],
            FieldClass::Token | FieldClass::Status => return None,
        };
        Some(values)
    });

    if by_class.is_some() {
        return by_class;
    }

    match value {
        Value::String(_) => Some(vec![json!(""), long_string(), json!("名前 ✓"), json!(null)]),
        Value::Number(n) if n.is_f64() => Some(vec![json!(0.0), json!(-1.5), json!(f64::MAX)]),
        Value::Number(_) => Some(vec![json!(0), json!(-1), json!(i64::MAX)]),
        Value::Bool(b) => Some(vec![json!(!b), json!("true")]),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
