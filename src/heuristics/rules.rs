//! Ordered field-classification rules

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Semantic class of a body field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldClass {
    /// Password or secret
    Password,
    /// Bearer, session or API token
    Token,
    /// Email address
    Email,
    /// Phone number
    Phone,
    /// Link
    Url,
    /// Date or date-time
    Timestamp,
    /// Monetary amount
    Currency,
    /// Record identifier
    Identifier,
    /// Count or size
    Quantity,
    /// Enumerated state
    Status,
    /// Human readable name or title
    Name,
}

/// One classification rule; matches on the field name or the value
pub struct FieldRule {
    /// Class assigned on a match
    pub class: FieldClass,
    /// Pattern tested against the field name
    pub name: Option<Regex>,
    /// Pattern tested against string values
    pub value: Option<Regex>,
    /// Confidence attached to suggestions derived from this rule
    pub confidence: u8,
}

impl FieldRule {
    fn matches(&self, name: &str, value: Option<&Value>) -> bool {
        let by_name = self.name.as_ref().is_some_and(|re| re.is_match(name));
        let by_value = match (&self.value, value.and_then(Value::as_str)) {
            (Some(re), Some(text)) => re.is_match(text),
            _ => false,
        };
        by_name || by_value
    }
}

fn rule(class: FieldClass, name: Option<&str>, value: Option<&str>, confidence: u8) -> FieldRule {
    FieldRule {
        class,
        name: name.map(|p| Regex::new(p).unwrap()),
        value: value.map(|p| Regex::new(p).unwrap()),
        confidence,
    }
}

/// Classification table; the first matching rule wins
pub static FIELD_RULES: Lazy<Vec<FieldRule>> = Lazy::new(|| {
    vec![
        rule(
            FieldClass::Password,
            Some(r"(?i)(password|passwd|passphrase|secret)"),
            None,
            95,
        ),
        rule(
            FieldClass::Token,
            Some(r"(?i)(token|jwt|session_?id|api_?key|bearer)"),
            Some(r"^eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]*$"),
            90,
        ),
        rule(
            FieldClass::Email,
            Some(r"(?i)e-?mail"),
            Some(r"^[^\s@]+@[^\s@]+\.[^\s@]+$"),
            85,
        ),
        rule(
            FieldClass::Phone,
            Some(r"(?i)(phone|mobile|msisdn)"),
            Some(r"^\+[1-9]\d{6,14}$"),
            75,
        ),
        rule(
            FieldClass::Url,
            Some(r"(?i)(url|uri|href|link|website)$"),
            Some(r"^https?://\S+$"),
            75,
        ),
        rule(
            FieldClass::Timestamp,
            Some(r"(?i:created|updated|deleted|timestamp|_at$|date$|time$)|[a-z]At$"),
            Some(r"^\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?$"),
            80,
        ),
        rule(
            FieldClass::Currency,
            Some(r"(?i)(price|amount|cost|total|balance|fee|salary)"),
            None,
            70,
        ),
        rule(
            FieldClass::Identifier,
            Some(r"^(?i:id|uuid|guid)$|_(?i:id)$|[a-z]Id$|ID$"),
            Some(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"),
            80,
        ),
        rule(
            FieldClass::Quantity,
            Some(r"(?i)(count|qty|quantity|size|limit|offset|page)$|^(?i:age)$"),
            None,
            65,
        ),
        rule(FieldClass::Status, Some(r"(?i)^(status|state)$"), None, 60),
        rule(
            FieldClass::Name,
            Some(r"(?i)(name|title|label)$"),
            None,
            50,
        ),
    ]
});

/// Classify a field by name and value
#[must_use]
pub fn classify(name: &str, value: Option<&Value>) -> Option<FieldClass> {
    classify_field(name, value).map(|rule| rule.class)
}

/// Matching rule for a field, if any
#[must_use]
pub fn classify_field(name: &str, value: Option<&Value>) -> Option<&'static FieldRule> {
    FIELD_RULES.iter().find(|rule| rule.matches(name, value))
}
