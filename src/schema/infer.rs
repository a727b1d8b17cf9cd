//! Single-sample schema inference

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::merge::merge;
use super::{SchemaNode, StringFormat};
use crate::wire::{self, WireField, WireValue};

/// Default nesting depth followed before giving up on a sample
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// How a format rule recognises a string
enum FormatTest {
    Pattern(Regex),
    Prefix(&'static [&'static str]),
}

impl FormatTest {
    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Pattern(regex) => regex.is_match(value),
            Self::Prefix(prefixes) => {
                let lower = value.to_ascii_lowercase();
                prefixes.iter().any(|p| lower.starts_with(p)) && !value.contains(char::is_whitespace)
            }
        }
    }
}

fn pattern(source: &str) -> FormatTest {
    FormatTest::Pattern(Regex::new(source).unwrap())
}

/// Ordered format rules; the first match wins
static FORMAT_RULES: Lazy<Vec<(StringFormat, FormatTest)>> = Lazy::new(|| {
    vec![
        (
            StringFormat::Uuid,
            pattern(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"),
        ),
        (
            StringFormat::DateTime,
            pattern(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$"),
        ),
        (StringFormat::Date, pattern(r"^\d{4}-\d{2}-\d{2}$")),
        (StringFormat::Email, pattern(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")),
        (
            StringFormat::Uri,
            FormatTest::Prefix(&["http://", "https://", "ftp://", "ws://", "wss://"]),
        ),
        (
            StringFormat::Phone,
            pattern(r"^(\+[1-9]\d{6,14}|\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4})$"),
        ),
    ]
});

/// Classify a string into a semantic format, if any rule matches
#[must_use]
pub fn detect_format(value: &str) -> Option<StringFormat> {
    FORMAT_RULES
        .iter()
        .find(|(_, test)| test.matches(value))
        .map(|(format, _)| *format)
}

/// Infer a schema with the default depth limit
#[must_use]
pub fn infer(value: &Value) -> SchemaNode {
    Inferrer::default().infer(value)
}

/// Schema inferrer with a recursion limit
#[derive(Debug, Clone, Copy)]
pub struct Inferrer {
    max_depth: usize,
}

impl Default for Inferrer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl Inferrer {
    /// Create an inferrer that stops descending after `max_depth` levels
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    /// Infer the structural schema of one sample
    #[must_use]
    pub fn infer(&self, value: &Value) -> SchemaNode {
        self.infer_at(value, 0)
    }

    fn infer_at(&self, value: &Value, depth: usize) -> SchemaNode {
        if depth >= self.max_depth {
            return SchemaNode::empty_object();
        }

        match value {
            Value::Null => SchemaNode::Null,
            Value::Bool(_) => SchemaNode::Boolean,
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    SchemaNode::Integer
                } else {
                    SchemaNode::Number
                }
            }
            Value::String(s) => SchemaNode::String {
                format: detect_format(s),
            },
            Value::Array(items) => {
                let item = items
                    .first()
                    .map_or_else(SchemaNode::empty_object, |first| {
                        self.infer_at(first, depth + 1)
                    });
                SchemaNode::array_of(item)
            }
            Value::Object(map) => {
                let mut properties = BTreeMap::new();
                let mut required = BTreeSet::new();
                for (key, field) in map {
                    if !field.is_null() {
                        required.insert(key.clone());
                    }
                    properties.insert(key.clone(), self.infer_at(field, depth + 1));
                }
                SchemaNode::Object {
                    properties,
                    required,
                }
            }
        }
    }

    /// Infer an object schema from decoded wire fields
    ///
    /// Fields are named `field_<number>`; repeated numbers become arrays.
    #[must_use]
    pub fn infer_wire(&self, fields: &[WireField]) -> SchemaNode {
        self.infer_wire_at(fields, 0)
    }

    fn infer_wire_at(&self, fields: &[WireField], depth: usize) -> SchemaNode {
        if depth >= self.max_depth {
            return SchemaNode::empty_object();
        }

        let mut grouped: BTreeMap<u32, Vec<SchemaNode>> = BTreeMap::new();
        for field in fields {
            let node = match &field.value {
                WireValue::Varint(_) | WireValue::Fixed32(_) => SchemaNode::Integer,
                WireValue::Fixed64(_) | WireValue::Bytes(_) => SchemaNode::string(),
                WireValue::Text(text) => SchemaNode::String {
                    format: detect_format(text),
                },
                WireValue::Message(bytes) => {
                    let nested = wire::decode(bytes);
                    self.infer_wire_at(&nested.fields, depth + 1)
                }
            };
            grouped.entry(field.field_number).or_default().push(node);
        }

        let mut properties = BTreeMap::new();
        let mut required = BTreeSet::new();
        for (number, nodes) in grouped {
            let name = format!("field_{number}");
            let repeated = nodes.len() > 1;
            let merged = nodes
                .into_iter()
                .reduce(|a, b| merge(&a, &b))
                .unwrap_or(SchemaNode::Null);
            let node = if repeated {
                SchemaNode::array_of(merged)
            } else {
                merged
            };
            required.insert(name.clone());
            properties.insert(name, node);
        }

        SchemaNode::Object {
            properties,
            required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_primitives() {
        assert_eq!(infer(&json!(null)), SchemaNode::Null);
        assert_eq!(infer(&json!(true)), SchemaNode::Boolean);
        assert_eq!(infer(&json!(42)), SchemaNode::Integer);
        assert_eq!(infer(&json!(-7)), SchemaNode::Integer);
        assert_eq!(infer(&json!(4.5)), SchemaNode::Number);
        assert_eq!(infer(&json!("plain")), SchemaNode::string());
    }

    #[test]
    fn test_user_scenario() {
        let sample = json!({"id": 42, "email": "a@b.com", "createdAt": "2024-01-01T00:00:00Z"});
        let node = infer(&sample);

        assert_eq!(node.property("id"), Some(&SchemaNode::Integer));
        assert_eq!(
            node.property("email"),
            Some(&SchemaNode::formatted(StringFormat::Email))
        );
        assert_eq!(
            node.property("createdAt"),
            Some(&SchemaNode::formatted(StringFormat::DateTime))
        );
        assert!(node.is_required("id"));
        assert!(node.is_required("email"));
        assert!(node.is_required("createdAt"));
    }

    #[test]
    fn test_null_fields_not_required() {
        let node = infer(&json!({"a": null, "b": 1}));
        assert!(!node.is_required("a"));
        assert!(node.is_required("b"));
        assert_eq!(node.property("a"), Some(&SchemaNode::Null));
    }

    #[test]
    fn test_array_uses_first_element() {
        let node = infer(&json!([{"x": 1}, {"y": "z"}]));
        match node {
            SchemaNode::Array { items } => {
                assert!(items.property("x").is_some());
                assert!(items.property("y").is_none());
            }
            other => panic!("expected array, got {other}"),
        }
    }

    #[test]
    fn test_empty_array_is_array_of_empty_object() {
        assert_eq!(
            infer(&json!([])),
            SchemaNode::array_of(SchemaNode::empty_object())
        );
    }

    #[test]
    fn test_format_rules_first_match_wins() {
        assert_eq!(
            detect_format("123e4567-e89b-12d3-a456-426614174000"),
            Some(StringFormat::Uuid)
        );
        assert_eq!(detect_format("2024-01-01T10:20:30.123+02:00"), Some(StringFormat::DateTime));
        assert_eq!(detect_format("2024-01-01"), Some(StringFormat::Date));
        assert_eq!(detect_format("dev@example.org"), Some(StringFormat::Email));
        assert_eq!(detect_format("https://example.org/a"), Some(StringFormat::Uri));
        assert_eq!(detect_format("+14155552671"), Some(StringFormat::Phone));
        assert_eq!(detect_format("(415) 555-2671"), Some(StringFormat::Phone));
        assert_eq!(detect_format("42"), None);
        assert_eq!(detect_format("hello world"), None);
        // email is tested before the uri prefix
        assert_eq!(detect_format("https://user@host.com"), Some(StringFormat::Email));
    }

    #[test]
    fn test_depth_limit() {
        let inferrer = Inferrer::new(2);
        let node = inferrer.infer(&json!({"a": {"b": {"c": 1}}}));
        let a = node.property("a").unwrap();
        assert_eq!(a.property("b"), Some(&SchemaNode::empty_object()));
    }

    #[test]
    fn test_infer_wire_fields() {
        // field 1 varint 150, field 2 "hi", field 2 "yo"
        let bytes = [0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i', 0x12, 0x02, b'y', b'o'];
        let decoded = wire::decode(&bytes);
        assert!(decoded.success);

        let node = Inferrer::default().infer_wire(&decoded.fields);
        assert_eq!(node.property("field_1"), Some(&SchemaNode::Integer));
        assert_eq!(
            node.property("field_2"),
            Some(&SchemaNode::array_of(SchemaNode::string()))
        );
        assert!(node.is_required("field_1"));
    }
}
