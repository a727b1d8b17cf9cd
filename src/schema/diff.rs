//! Schema document diffing for auto-healing generated tests

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::openapi::{Operation, Parameter, SchemaDocument};
use super::SchemaNode;
use crate::endpoint::EndpointKey;

/// What happened to a field between two documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ChangeKind {
    /// Field appeared
    Added,
    /// Field disappeared
    Removed,
    /// Field changed shape
    TypeChanged {
        /// Previous type
        from: String,
        /// Current type
        to: String,
    },
    /// Field became mandatory
    BecameRequired,
    /// Field became optional
    BecameOptional,
}

/// One field-level difference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    /// Affected endpoint
    pub endpoint: EndpointKey,
    /// `request`, `response <status>` or `parameter`
    pub location: String,
    /// Dotted field path; `[]` marks array items
    pub path: String,
    /// Change kind
    #[serde(flatten)]
    pub kind: ChangeKind,
    /// Whether existing tests are likely to fail
    pub breaking: bool,
    /// Suggested test update
    pub hint: String,
}

/// Differences between a reference document and the current one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiff {
    /// Endpoints only in the current document
    pub added_endpoints: Vec<EndpointKey>,
    /// Endpoints only in the reference document
    pub removed_endpoints: Vec<EndpointKey>,
    /// Field changes on shared endpoints
    pub changes: Vec<FieldChange>,
    /// Removed endpoints plus breaking field changes
    pub breaking_changes: usize,
}

impl SchemaDiff {
    /// Whether the documents describe the same surface
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_endpoints.is_empty() && self.removed_endpoints.is_empty() && self.changes.is_empty()
    }
}

/// Compare a reference document with the current one
#[must_use]
pub fn diff_documents(previous: &SchemaDocument, current: &SchemaDocument) -> SchemaDiff {
    let prev: BTreeMap<EndpointKey, &Operation> = previous.endpoints().collect();
    let cur: BTreeMap<EndpointKey, &Operation> = current.endpoints().collect();

    let mut diff = SchemaDiff::default();
    for key in cur.keys().filter(|k| !prev.contains_key(*k)) {
        diff.added_endpoints.push(key.clone());
    }
    for key in prev.keys().filter(|k| !cur.contains_key(*k)) {
        diff.removed_endpoints.push(key.clone());
    }

    for (key, before) in &prev {
        if let Some(after) = cur.get(key) {
            let mut walker = Walker {
                endpoint: key,
                location: String::new(),
                request: true,
                changes: &mut diff.changes,
            };
            walker.operation(before, after);
        }
    }

    diff.breaking_changes =
        diff.removed_endpoints.len() + diff.changes.iter().filter(|c| c.breaking).count();
    diff
}

struct Walker<'a> {
    endpoint: &'a EndpointKey,
    location: String,
    request: bool,
    changes: &'a mut Vec<FieldChange>,
}

impl Walker<'_> {
    fn operation(&mut self, before: &Operation, after: &Operation) {
        self.parameters(&before.parameters, &after.parameters);

        self.location = "request".to_string();
        self.request = true;
        if let (Some(a), Some(b)) = (&before.request_body, &after.request_body) {
            self.node("", a, b);
        }

        self.request = false;
        for (status, spec) in &before.responses {
            self.location = format!("response {status}");
            match after.responses.get(status) {
                Some(now) => {
                    if let (Some(a), Some(b)) = (&spec.schema, &now.schema) {
                        self.node("", a, b);
                    }
                }
                None => self.push("", ChangeKind::Removed),
            }
        }
        for status in after.responses.keys() {
            if !before.responses.contains_key(status) {
                self.location = format!("response {status}");
                self.push("", ChangeKind::Added);
            }
        }
    }

    fn parameters(&mut self, before: &[Parameter], after: &[Parameter]) {
        self.location = "parameter".to_string();
        self.request = true;

        let index = |params: &[Parameter]| -> BTreeMap<String, bool> {
            params
                .iter()
                .map(|p| (p.name.clone(), p.required))
                .collect()
        };
        let (a, b) = (index(before), index(after));

        for (name, required) in &a {
            match b.get(name) {
                None => self.push(name, ChangeKind::Removed),
                Some(now) if now != required => self.push(
                    name,
                    if *now {
                        ChangeKind::BecameRequired
                    } else {
                        ChangeKind::BecameOptional
                    },
                ),
                Some(_) => {}
            }
        }
        for (name, required) in &b {
            if !a.contains_key(name) {
                // a new optional parameter can be ignored by existing tests
                if *required {
                    self.push(name, ChangeKind::BecameRequired);
                } else {
                    self.push(name, ChangeKind::Added);
                }
            }
        }
    }

    fn node(&mut self, path: &str, before: &SchemaNode, after: &SchemaNode) {
        match (before, after) {
            (SchemaNode::Null, _) | (_, SchemaNode::Null) => {}
            (
                SchemaNode::Object {
                    properties: pa,
                    required: ra,
                },
                SchemaNode::Object {
                    properties: pb,
                    required: rb,
                },
            ) => {
                let names: BTreeSet<&String> = pa.keys().chain(pb.keys()).collect();
                for name in names {
                    let child = join(path, name);
                    match (pa.get(name), pb.get(name)) {
                        (Some(_), None) => self.push(&child, ChangeKind::Removed),
                        (None, Some(_)) => self.push(&child, ChangeKind::Added),
                        (Some(a), Some(b)) => {
                            match (ra.contains(name), rb.contains(name)) {
                                (false, true) => self.push(&child, ChangeKind::BecameRequired),
                                (true, false) => self.push(&child, ChangeKind::BecameOptional),
                                _ => {}
                            }
                            self.node(&child, a, b);
                        }
                        (None, None) => {}
                    }
                }
            }
            (SchemaNode::Array { items: a }, SchemaNode::Array { items: b }) => {
                self.node(&format!("{path}[]"), a, b);
            }
            (a, b) if a != b => self.push(
                path,
                ChangeKind::TypeChanged {
                    from: a.to_string(),
                    to: b.to_string(),
                },
            ),
            _ => {}
        }
    }

    fn push(&mut self, path: &str, kind: ChangeKind) {
        let (breaking, hint) = self.assess(path, &kind);
        self.changes.push(FieldChange {
            endpoint: self.endpoint.clone(),
            location: self.location.clone(),
            path: path.to_string(),
            kind,
            breaking,
            hint,
        });
    }

    /// Breaking flag and healing hint for a change
    fn assess(&self, path: &str, kind: &ChangeKind) -> (bool, String) {
        let target = if path.is_empty() {
            self.location.clone()
        } else {
            format!("`{path}`")
        };

        match (self.request, kind) {
            (false, ChangeKind::Removed) => (true, format!("Remove assertions on {target}")),
            (false, ChangeKind::Added) => (false, format!("Consider asserting on {target}")),
            (false, ChangeKind::BecameOptional) => (
                true,
                format!("Guard assertions on {target} with a presence check"),
            ),
            (false, ChangeKind::BecameRequired) => {
                (false, format!("{target} can be asserted unconditionally"))
            }
            (true, ChangeKind::Removed) => (false, format!("Stop sending {target}")),
            (true, ChangeKind::Added) => (false, format!("{target} may be sent optionally")),
            (true, ChangeKind::BecameRequired) => (true, format!("Add {target} to every request")),
            (true, ChangeKind::BecameOptional) => (false, format!("{target} may be omitted")),
            (_, ChangeKind::TypeChanged { from, to }) => (
                kind_of(from) != kind_of(to),
                format!("Update {target} from {from} to {to}"),
            ),
        }
    }
}

/// Kind name of a rendered node (`string(email)` -> `string`)
fn kind_of(rendered: &str) -> &str {
    rendered.split(['(', '<']).next().unwrap_or(rendered)
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaExtractor;
    use crate::session::RecordedExchange;
    use serde_json::{json, Value};

    fn document(body: Value) -> SchemaDocument {
        let mut e = RecordedExchange::new("GET", "/api/users/1");
        e.status = Some(200);
        e.response_body = Some(body);
        SchemaExtractor::default().extract_exchanges(&[e])
    }

    #[test]
    fn test_identical_documents() {
        let a = document(json!({"id": 1, "email": "a@b.com"}));
        let diff = diff_documents(&a, &a);
        assert!(diff.is_empty());
        assert_eq!(diff.breaking_changes, 0);
    }

    #[test]
    fn test_removed_and_retyped_fields_are_breaking() {
        let before = document(json!({"id": 1, "email": "a@b.com", "tags": ["x"]}));
        let after = document(json!({"id": "u-1", "tags": ["x"], "nick": "n"}));
        let diff = diff_documents(&before, &after);

        let email = diff.changes.iter().find(|c| c.path == "email").unwrap();
        assert_eq!(email.kind, ChangeKind::Removed);
        assert!(email.breaking);
        assert_eq!(email.location, "response 200");

        let id = diff.changes.iter().find(|c| c.path == "id").unwrap();
        assert_eq!(
            id.kind,
            ChangeKind::TypeChanged {
                from: "integer".to_string(),
                to: "string".to_string()
            }
        );
        assert!(id.breaking);

        let nick = diff.changes.iter().find(|c| c.path == "nick").unwrap();
        assert!(!nick.breaking);
        assert_eq!(diff.breaking_changes, 2);
    }

    #[test]
    fn test_format_change_is_not_breaking() {
        let before = document(json!({"contact": "a@b.com"}));
        let after = document(json!({"contact": "https://b.com"}));
        let diff = diff_documents(&before, &after);
        assert_eq!(diff.changes.len(), 1);
        assert!(!diff.changes[0].breaking);
    }

    #[test]
    fn test_nested_array_paths() {
        let before = document(json!({"items": [{"sku": "a", "qty": 1}]}));
        let after = document(json!({"items": [{"sku": "a"}]}));
        let diff = diff_documents(&before, &after);
        assert_eq!(diff.changes[0].path, "items[].qty");
    }

    #[test]
    fn test_endpoint_added_and_removed() {
        let before = document(json!({"id": 1}));
        let mut e = RecordedExchange::new("GET", "/api/orders");
        e.status = Some(200);
        let after = SchemaExtractor::default().extract_exchanges(&[e]);

        let diff = diff_documents(&before, &after);
        assert_eq!(diff.added_endpoints, vec![EndpointKey::new("GET", "/api/orders")]);
        assert_eq!(
            diff.removed_endpoints,
            vec![EndpointKey::new("GET", "/api/users/1")]
        );
        assert_eq!(diff.breaking_changes, 1);
    }

    #[test]
    fn test_request_field_became_required() {
        let make = |bodies: Vec<Value>| {
            let exchanges: Vec<RecordedExchange> = bodies
                .into_iter()
                .map(|body| {
                    let mut e = RecordedExchange::new("POST", "/login");
                    e.request_body = Some(body);
                    e
                })
                .collect();
            SchemaExtractor::default().extract_exchanges(&exchanges)
        };
        let before = make(vec![json!({"user": "a", "otp": "1"}), json!({"user": "b"})]);
        let after = make(vec![json!({"user": "a", "otp": "1"})]);

        let diff = diff_documents(&before, &after);
        let otp = diff.changes.iter().find(|c| c.path == "otp").unwrap();
        assert_eq!(otp.kind, ChangeKind::BecameRequired);
        assert_eq!(otp.location, "request");
        assert!(otp.breaking);
    }

    #[test]
    fn test_change_serializes_flat() {
        let before = document(json!({"id": 1}));
        let after = document(json!({"id": 1.5}));
        let diff = diff_documents(&before, &after);
        let value = serde_json::to_value(&diff.changes[0]).unwrap();
        assert_eq!(value["kind"], "type-changed");
        assert_eq!(value["from"], "integer");
        assert_eq!(value["endpoint"], "GET /api/users/{id}");
    }
}
