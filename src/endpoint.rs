//! Endpoint grouping: URL paths to templates, exchanges to logical operations

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::session::RecordedExchange;
use crate::ApiscopeError;

/// Placeholder name for the first identifier segment in a path
pub const PLACEHOLDER: &str = "id";

static INTEGER_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});
static OBJECT_ID_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").unwrap());

/// Kind of identifier a path segment was recognised as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// All digits
    Integer,
    /// RFC 4122 style UUID
    Uuid,
    /// 24 hex digits (document store object id)
    ObjectId,
}

/// Classify a path segment as an identifier, if it is one
#[must_use]
pub fn classify_segment(segment: &str) -> Option<SegmentKind> {
    if INTEGER_SEGMENT.is_match(segment) {
        Some(SegmentKind::Integer)
    } else if UUID_SEGMENT.is_match(segment) {
        Some(SegmentKind::Uuid)
    } else if OBJECT_ID_SEGMENT.is_match(segment) {
        Some(SegmentKind::ObjectId)
    } else {
        None
    }
}

/// Normalize a URL path
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();

    let mut normalized = if trimmed.is_empty() || !trimmed.starts_with('/') {
        format!("/{trimmed}")
    } else {
        trimmed.to_string()
    };

    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Replace identifier segments of a path with placeholders
///
/// The first identifier becomes `{id}`, later ones `{id2}`, `{id3}`, ...
#[must_use]
pub fn path_template(path: &str) -> String {
    let normalized = normalize_path(path);
    let mut placeholders = 0usize;

    let segments: Vec<String> = normalized
        .split('/')
        .map(|segment| {
            if classify_segment(segment).is_some() {
                placeholders += 1;
                placeholder_name(placeholders)
            } else {
                segment.to_string()
            }
        })
        .collect();

    segments.join("/")
}

fn placeholder_label(index: usize) -> String {
    if index == 1 {
        PLACEHOLDER.to_string()
    } else {
        format!("{PLACEHOLDER}{index}")
    }
}

fn placeholder_name(index: usize) -> String {
    format!("{{{}}}", placeholder_label(index))
}

/// Logical operation identity: method plus path template
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointKey {
    /// Upper-cased HTTP method
    pub method: String,
    /// Path template
    pub template: String,
}

impl EndpointKey {
    /// Build a key from a method and a concrete path
    #[must_use]
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.trim().to_uppercase(),
            template: path_template(path),
        }
    }

    /// Derive the key for an exchange; `None` when its URL is unparseable
    #[must_use]
    pub fn from_exchange(exchange: &RecordedExchange) -> Option<Self> {
        let url = exchange.parsed_url()?;
        Some(Self::new(&exchange.method, url.path()))
    }

    /// Placeholder names in template order
    #[must_use]
    pub fn placeholders(&self) -> Vec<String> {
        self.template
            .split('/')
            .filter_map(|s| s.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
            .map(str::to_string)
            .collect()
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}

impl FromStr for EndpointKey {
    type Err = ApiscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (method, template) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| ApiscopeError::Other(format!("Invalid endpoint key: {s}")))?;
        Ok(Self {
            method: method.to_uppercase(),
            template: template.trim().to_string(),
        })
    }
}

impl Serialize for EndpointKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EndpointKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Group exchanges by endpoint, preserving capture order within each group
///
/// Exchanges with unparseable URLs are skipped.
#[must_use]
pub fn group_exchanges(
    exchanges: &[RecordedExchange],
) -> BTreeMap<EndpointKey, Vec<&RecordedExchange>> {
    let mut groups: BTreeMap<EndpointKey, Vec<&RecordedExchange>> = BTreeMap::new();

    for exchange in exchanges {
        match EndpointKey::from_exchange(exchange) {
            Some(key) => groups.entry(key).or_default().push(exchange),
            None => debug!("Skipping exchange {} with unparseable URL", exchange.id),
        }
    }

    groups
}

/// Query parameter observed across a group of exchanges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameter {
    /// Parameter name
    pub name: String,
    /// Present in every exchange of the group
    pub required: bool,
    /// Distinct observed values, in first-seen order
    pub examples: Vec<String>,
}

/// Union of query keys across a group; required only when always present
#[must_use]
pub fn query_parameters(group: &[&RecordedExchange]) -> Vec<QueryParameter> {
    let mut seen: BTreeMap<String, (usize, Vec<String>)> = BTreeMap::new();
    let mut parsed = 0usize;

    for exchange in group {
        let Some(url) = exchange.parsed_url() else {
            continue;
        };
        parsed += 1;

        let mut keys_here = BTreeSet::new();
        for (key, value) in url.query_pairs() {
            let entry = seen.entry(key.to_string()).or_default();
            if keys_here.insert(key.to_string()) {
                entry.0 += 1;
            }
            if !entry.1.iter().any(|v| *v == *value) {
                entry.1.push(value.to_string());
            }
        }
    }

    seen.into_iter()
        .map(|(name, (count, examples))| QueryParameter {
            name,
            required: parsed > 0 && count == parsed,
            examples,
        })
        .collect()
}

/// Path placeholder with the concrete segment that filled it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParameter {
    /// Placeholder name
    pub name: String,
    /// Observed segment
    pub sample: String,
    /// Identifier kind of the observed segment
    pub kind: SegmentKind,
}

/// Pair each placeholder of a path's template with its concrete segment
#[must_use]
pub fn path_parameters(path: &str) -> Vec<PathParameter> {
    let normalized = normalize_path(path);
    normalized
        .split('/')
        .filter_map(|segment| classify_segment(segment).map(|kind| (segment, kind)))
        .enumerate()
        .map(|(i, (segment, kind))| PathParameter {
            name: placeholder_label(i + 1),
            sample: segment.to_string(),
            kind,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_normalization() {
        assert_eq!(normalize_path("/api/test"), "/api/test");
        assert_eq!(normalize_path("api/test"), "/api/test");
        assert_eq!(normalize_path("  /api/test/  "), "/api/test");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_template_integer() {
        assert_eq!(path_template("/api/users/42"), "/api/users/{id}");
    }

    #[test]
    fn test_template_uuid_and_object_id() {
        assert_eq!(
            path_template("/orders/123e4567-e89b-12d3-a456-426614174000/items/507f1f77bcf86cd799439011"),
            "/orders/{id}/items/{id2}"
        );
    }

    #[test]
    fn test_template_keeps_words() {
        assert_eq!(path_template("/api/v2/users/me"), "/api/v2/users/me");
        // 23 hex digits is not an object id
        assert_eq!(
            path_template("/x/507f1f77bcf86cd79943901"),
            "/x/507f1f77bcf86cd79943901"
        );
    }

    #[test]
    fn test_endpoint_key_display_roundtrip() {
        let key = EndpointKey::new("get", "/api/users/42");
        assert_eq!(key.to_string(), "GET /api/users/{id}");
        let parsed: EndpointKey = "GET /api/users/{id}".parse().unwrap();
        assert_eq!(parsed, key);
        assert!("GET".parse::<EndpointKey>().is_err());
    }

    #[test]
    fn test_endpoint_key_serializes_as_string() {
        let mut map = BTreeMap::new();
        map.insert(EndpointKey::new("POST", "/login"), 1);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"POST /login":1}"#);
        let back: BTreeMap<EndpointKey, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_group_exchanges() {
        let exchanges = vec![
            RecordedExchange::new("GET", "https://a.test/api/users/1"),
            RecordedExchange::new("GET", "https://a.test/api/users/2"),
            RecordedExchange::new("DELETE", "https://a.test/api/users/2"),
            RecordedExchange::new("GET", "::broken::"),
        ];

        let groups = group_exchanges(&exchanges);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&EndpointKey::new("GET", "/api/users/9")].len(), 2);
    }

    #[test]
    fn test_query_parameters_required_only_when_always_present() {
        let a = RecordedExchange::new("GET", "https://a.test/search?q=one&page=1");
        let b = RecordedExchange::new("GET", "https://a.test/search?q=two");
        let params = query_parameters(&[&a, &b]);

        assert_eq!(params.len(), 2);
        let page = params.iter().find(|p| p.name == "page").unwrap();
        let q = params.iter().find(|p| p.name == "q").unwrap();
        assert!(!page.required);
        assert!(q.required);
        assert_eq!(q.examples, vec!["one", "two"]);
    }

    #[test]
    fn test_path_parameters() {
        let params = path_parameters("/users/42/posts/507f1f77bcf86cd799439011");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "id");
        assert_eq!(params[0].kind, SegmentKind::Integer);
        assert_eq!(params[1].name, "id2");
        assert_eq!(params[1].sample, "507f1f77bcf86cd799439011");
    }

    #[test]
    fn test_placeholders() {
        let key = EndpointKey::new("GET", "/a/1/b/2");
        assert_eq!(key.placeholders(), vec!["id", "id2"]);
    }
}
