//! GraphQL-style schema inference and SDL rendering

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::openapi::pascal_case;
use super::{Inferrer, Merger, SchemaNode, StringFormat};
use crate::config::SchemaConfig;
use crate::session::{RecordedExchange, RecordingSession};

/// Custom scalar used for values without a fixed shape
pub const JSON_SCALAR: &str = "JSON";

/// Root operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Read
    Query,
    /// Write
    Mutation,
    /// Stream
    Subscription,
}

impl OperationType {
    /// Root type name in SDL
    #[must_use]
    pub fn root_type(self) -> &'static str {
        match self {
            Self::Query => "Query",
            Self::Mutation => "Mutation",
            Self::Subscription => "Subscription",
        }
    }

    /// Operation type from the leading keyword of a document
    #[must_use]
    pub fn from_document(document: &str) -> Self {
        let body: String = document
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#'))
            .collect::<Vec<_>>()
            .join(" ");
        let keyword = body
            .trim_start()
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or_default();

        match keyword {
            "mutation" => Self::Mutation,
            "subscription" => Self::Subscription,
            _ => Self::Query,
        }
    }
}

/// Argument of a root field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlArgument {
    /// Variable name
    pub name: String,
    /// SDL type reference
    pub type_ref: String,
}

/// Field of an object or root type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlField {
    /// Field name
    pub name: String,
    /// SDL type reference (`User!`, `[Int]`, ...)
    pub type_ref: String,
    /// Arguments, root fields only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<GraphqlArgument>,
}

/// Inferred object type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlType {
    /// PascalCase type name
    pub name: String,
    /// Fields in name order
    pub fields: Vec<GraphqlField>,
}

/// Inferred GraphQL schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlDocument {
    /// Object types in name order
    pub types: Vec<GraphqlType>,
    /// Query root fields
    pub queries: Vec<GraphqlField>,
    /// Mutation root fields
    pub mutations: Vec<GraphqlField>,
    /// Subscription root fields
    pub subscriptions: Vec<GraphqlField>,
    /// Rendered schema definition language
    pub sdl: String,
    /// Operations that contributed samples
    pub sample_count: usize,
}

impl GraphqlDocument {
    /// Whether no GraphQL traffic was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.mutations.is_empty() && self.subscriptions.is_empty()
    }
}

/// Whether an exchange looks like GraphQL traffic
#[must_use]
pub fn is_graphql_exchange(exchange: &RecordedExchange) -> bool {
    let by_path = exchange
        .parsed_url()
        .is_some_and(|url| url.path().trim_end_matches('/').ends_with("/graphql"));

    by_path
        || exchange.request_json().is_some_and(|body| match &*body {
            Value::Object(map) => map.get("query").is_some_and(Value::is_string),
            Value::Array(items) => items
                .iter()
                .any(|item| item.get("query").is_some_and(Value::is_string)),
            _ => false,
        })
}

/// Infer a GraphQL document with default settings
#[must_use]
pub fn infer_document(session: &RecordingSession) -> GraphqlDocument {
    GraphqlInferrer::default().infer_document(session)
}

#[derive(Debug, Default)]
struct RootField {
    node: Option<SchemaNode>,
    nullable: bool,
    arguments: Option<SchemaNode>,
}

/// Builds a [`GraphqlDocument`] from GraphQL exchanges
#[derive(Debug, Clone, Default)]
pub struct GraphqlInferrer {
    inferrer: Inferrer,
    merger: Merger,
}

impl GraphqlInferrer {
    /// Create an inferrer from configuration
    #[must_use]
    pub fn new(config: &SchemaConfig) -> Self {
        Self {
            inferrer: Inferrer::new(config.max_depth),
            merger: Merger::new(config.merge_strategy),
        }
    }

    /// Infer the document for a session
    #[must_use]
    pub fn infer_document(&self, session: &RecordingSession) -> GraphqlDocument {
        self.infer_exchanges(&session.requests)
    }

    /// Infer the document for a list of exchanges
    #[must_use]
    pub fn infer_exchanges(&self, exchanges: &[RecordedExchange]) -> GraphqlDocument {
        let mut roots: BTreeMap<(OperationType, String), RootField> = BTreeMap::new();
        let mut sample_count = 0usize;

        for exchange in exchanges.iter().filter(|e| is_graphql_exchange(e)) {
            for (request, response) in operations(exchange) {
                let Some(query) = request.get("query").and_then(Value::as_str) else {
                    continue;
                };
                let Some(Value::Object(data)) = response.get("data") else {
                    debug!("GraphQL exchange {} has no data object", exchange.id);
                    continue;
                };
                sample_count += 1;

                let op = OperationType::from_document(query);
                let variables = variables(&request).map(|v| self.inferrer.infer(&v));

                for (name, value) in data {
                    let root = roots.entry((op, name.clone())).or_default();
                    root.nullable |= value.is_null();
                    let node = self.inferrer.infer(value);
                    root.node = Some(match root.node.take() {
                        Some(existing) => self.merger.merge(&existing, &node),
                        None => node,
                    });
                    if let Some(vars) = &variables {
                        root.arguments = Some(match root.arguments.take() {
                            Some(existing) => self.merger.merge(&existing, vars),
                            None => vars.clone(),
                        });
                    }
                }
            }
        }

        self.build(&roots, sample_count)
    }

    fn build(
        &self,
        roots: &BTreeMap<(OperationType, String), RootField>,
        sample_count: usize,
    ) -> GraphqlDocument {
        let mut objects: BTreeMap<String, SchemaNode> = BTreeMap::new();
        for ((_, name), root) in roots {
            if let Some(node) = &root.node {
                self.register(&root_type_name(name), node, &mut objects);
            }
        }

        let mut document = GraphqlDocument {
            sample_count,
            ..GraphqlDocument::default()
        };

        for ((op, name), root) in roots {
            let node = root.node.clone().unwrap_or(SchemaNode::Null);
            let mut type_ref = type_ref(&root_type_name(name), &node);
            if !root.nullable && !matches!(node, SchemaNode::Null) {
                type_ref.push('!');
            }
            let field = GraphqlField {
                name: name.clone(),
                type_ref,
                arguments: arguments(root.arguments.as_ref()),
            };
            match op {
                OperationType::Query => document.queries.push(field),
                OperationType::Mutation => document.mutations.push(field),
                OperationType::Subscription => document.subscriptions.push(field),
            }
        }

        document.types = objects
            .iter()
            .map(|(name, node)| GraphqlType {
                name: name.clone(),
                fields: object_fields(name, node),
            })
            .collect();
        document.sdl = render_sdl(&document);
        document
    }

    /// Record every named object type reachable from a node
    fn register(&self, name: &str, node: &SchemaNode, objects: &mut BTreeMap<String, SchemaNode>) {
        match node {
            SchemaNode::Object { properties, .. } if !properties.is_empty() => {
                let merged = match objects.get(name) {
                    Some(existing) => self.merger.merge(existing, node),
                    None => node.clone(),
                };
                objects.insert(name.to_string(), merged);
                for (field, child) in properties {
                    self.register(&child_type_name(name, field), child, objects);
                }
            }
            SchemaNode::Array { items } => self.register(name, items, objects),
            _ => {}
        }
    }
}

/// Request/response pairs carried by one exchange (batched arrays are zipped)
fn operations(exchange: &RecordedExchange) -> Vec<(Value, Value)> {
    let request = exchange.request_json().map(|v| v.into_owned()).or_else(|| {
        // GET style: ?query=...&variables=...
        let url = exchange.parsed_url()?;
        let mut map = serde_json::Map::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "query" => {
                    map.insert("query".to_string(), Value::String(value.into_owned()));
                }
                "variables" => {
                    if let Ok(vars) = serde_json::from_str(&value) {
                        map.insert("variables".to_string(), vars);
                    }
                }
                _ => {}
            }
        }
        (!map.is_empty()).then_some(Value::Object(map))
    });
    let Some(request) = request else {
        return Vec::new();
    };
    let Some(response) = exchange.response_json().map(|v| v.into_owned()) else {
        return Vec::new();
    };

    match (request, response) {
        (Value::Array(requests), Value::Array(responses)) => {
            requests.into_iter().zip(responses).collect()
        }
        (Value::Array(mut requests), response) if !requests.is_empty() => {
            vec![(requests.swap_remove(0), response)]
        }
        (request, response) => vec![(request, response)],
    }
}

fn variables(request: &Value) -> Option<Value> {
    match request.get("variables")? {
        Value::Object(map) if !map.is_empty() => Some(Value::Object(map.clone())),
        // some clients send variables as JSON text
        Value::String(text) => serde_json::from_str::<Value>(text)
            .ok()
            .filter(|v| v.as_object().is_some_and(|m| !m.is_empty())),
        _ => None,
    }
}

fn singular(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if lower.ends_with("ies") && word.len() > 3 {
        format!("{}y", &word[..word.len() - 3])
    } else if ["sses", "xes", "ches", "shes"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        word[..word.len() - 2].to_string()
    } else if lower.ends_with('s') && !lower.ends_with("ss") && word.len() > 1 {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn root_type_name(field: &str) -> String {
    pascal_case(&singular(field))
}

fn child_type_name(parent: &str, field: &str) -> String {
    format!("{parent}{}", pascal_case(&singular(field)))
}

/// SDL type reference for a node (without the outer `!`)
fn type_ref(name: &str, node: &SchemaNode) -> String {
    match node {
        SchemaNode::Boolean => "Boolean".to_string(),
        SchemaNode::Integer => "Int".to_string(),
        SchemaNode::Number => "Float".to_string(),
        SchemaNode::String {
            format: Some(StringFormat::Uuid),
        } => "ID".to_string(),
        SchemaNode::String { .. } => "String".to_string(),
        SchemaNode::Array { items } => format!("[{}]", type_ref(name, items)),
        SchemaNode::Object { properties, .. } if !properties.is_empty() => name.to_string(),
        SchemaNode::Null | SchemaNode::Object { .. } | SchemaNode::Union { .. } => {
            JSON_SCALAR.to_string()
        }
    }
}

fn object_fields(name: &str, node: &SchemaNode) -> Vec<GraphqlField> {
    let SchemaNode::Object {
        properties,
        required,
    } = node
    else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(field, child)| {
            let mut type_ref = type_ref(&child_type_name(name, field), child);
            if required.contains(field) {
                type_ref.push('!');
            }
            GraphqlField {
                name: field.clone(),
                type_ref,
                arguments: Vec::new(),
            }
        })
        .collect()
}

fn arguments(variables: Option<&SchemaNode>) -> Vec<GraphqlArgument> {
    let Some(SchemaNode::Object {
        properties,
        required,
    }) = variables
    else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, node)| {
            // input objects are not inferred
            let mut type_ref = match node {
                SchemaNode::Object { .. } => JSON_SCALAR.to_string(),
                other => type_ref(JSON_SCALAR, other),
            };
            if required.contains(name) {
                type_ref.push('!');
            }
            GraphqlArgument {
                name: name.clone(),
                type_ref,
            }
        })
        .collect()
}

fn render_fields(out: &mut String, type_name: &str, fields: &[GraphqlField]) {
    let _ = writeln!(out, "type {type_name} {{");
    for field in fields {
        if field.arguments.is_empty() {
            let _ = writeln!(out, "  {}: {}", field.name, field.type_ref);
        } else {
            let args: Vec<String> = field
                .arguments
                .iter()
                .map(|a| format!("{}: {}", a.name, a.type_ref))
                .collect();
            let _ = writeln!(out, "  {}({}): {}", field.name, args.join(", "), field.type_ref);
        }
    }
    out.push_str("}\n");
}

/// Render a document as schema definition language
#[must_use]
pub fn render_sdl(document: &GraphqlDocument) -> String {
    let mut blocks = Vec::new();

    for (op, fields) in [
        (OperationType::Query, &document.queries),
        (OperationType::Mutation, &document.mutations),
        (OperationType::Subscription, &document.subscriptions),
    ] {
        if !fields.is_empty() {
            let mut block = String::new();
            render_fields(&mut block, op.root_type(), fields);
            blocks.push(block);
        }
    }

    for object in &document.types {
        let mut block = String::new();
        render_fields(&mut block, &object.name, &object.fields);
        blocks.push(block);
    }

    let uses_json = blocks.iter().any(|b| b.contains(JSON_SCALAR));
    if uses_json {
        blocks.push(format!("scalar {JSON_SCALAR}\n"));
    }

    blocks.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graphql(request: Value, response: Value) -> RecordedExchange {
        let mut e = RecordedExchange::new("POST", "https://api.test/graphql");
        e.request_body = Some(request);
        e.response_body = Some(response);
        e
    }

    #[test]
    fn test_operation_type() {
        assert_eq!(OperationType::from_document("{ me { id } }"), OperationType::Query);
        assert_eq!(
            OperationType::from_document("query GetUser { user { id } }"),
            OperationType::Query
        );
        assert_eq!(
            OperationType::from_document("# login\nmutation Login($u: String!) { login }"),
            OperationType::Mutation
        );
        assert_eq!(
            OperationType::from_document("  subscription { ticks }"),
            OperationType::Subscription
        );
    }

    #[test]
    fn test_detection() {
        assert!(is_graphql_exchange(&RecordedExchange::new("POST", "/api/graphql")));
        let mut by_body = RecordedExchange::new("POST", "/gql");
        by_body.request_body = Some(json!({"query": "{ a }"}));
        assert!(is_graphql_exchange(&by_body));
        assert!(!is_graphql_exchange(&RecordedExchange::new("GET", "/api/users")));
    }

    #[test]
    fn test_singular() {
        assert_eq!(singular("users"), "user");
        assert_eq!(singular("categories"), "category");
        assert_eq!(singular("boxes"), "box");
        assert_eq!(singular("address"), "address");
        assert_eq!(singular("me"), "me");
    }

    #[test]
    fn test_infer_query_with_nested_types() {
        let exchanges = vec![graphql(
            json!({
                "query": "query GetUser($id: ID!) { user(id: $id) { id email posts { title } } }",
                "variables": {"id": "123e4567-e89b-12d3-a456-426614174000"}
            }),
            json!({"data": {"user": {
                "id": "123e4567-e89b-12d3-a456-426614174000",
                "email": "a@b.com",
                "posts": [{"title": "hello"}]
            }}}),
        )];

        let document = GraphqlInferrer::default().infer_exchanges(&exchanges);
        assert_eq!(document.sample_count, 1);
        assert_eq!(document.queries.len(), 1);

        let user = &document.queries[0];
        assert_eq!(user.type_ref, "User!");
        assert_eq!(
            user.arguments,
            vec![GraphqlArgument {
                name: "id".to_string(),
                type_ref: "ID!".to_string()
            }]
        );

        let names: Vec<&str> = document.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["User", "UserPost"]);
        let user_type = &document.types[0];
        let id = user_type.fields.iter().find(|f| f.name == "id").unwrap();
        assert_eq!(id.type_ref, "ID!");
        let posts = user_type.fields.iter().find(|f| f.name == "posts").unwrap();
        assert_eq!(posts.type_ref, "[UserPost]!");

        assert!(document.sdl.contains("type Query {\n  user(id: ID!): User!\n}"));
        assert!(document.sdl.contains("type UserPost {\n  title: String!\n}"));
        assert!(!document.sdl.contains("scalar JSON"));
    }

    #[test]
    fn test_samples_of_same_root_field_merge() {
        let exchanges = vec![
            graphql(
                json!({"query": "{ me { name nickname } }"}),
                json!({"data": {"me": {"name": "a", "nickname": "x"}}}),
            ),
            graphql(
                json!({"query": "{ me { name } }"}),
                json!({"data": {"me": {"name": "b"}}}),
            ),
        ];
        let document = GraphqlInferrer::default().infer_exchanges(&exchanges);
        assert_eq!(document.queries.len(), 1);
        let me = &document.types[0];
        assert_eq!(me.name, "Me");
        let nickname = me.fields.iter().find(|f| f.name == "nickname").unwrap();
        assert_eq!(nickname.type_ref, "String");
    }

    #[test]
    fn test_batched_mutations_and_json_scalar() {
        let exchanges = vec![graphql(
            json!([
                {"query": "mutation { login { token } }"},
                {"query": "{ settings }"}
            ]),
            json!([
                {"data": {"login": {"token": "abc"}}},
                {"data": {"settings": null}}
            ]),
        )];
        let document = GraphqlInferrer::default().infer_exchanges(&exchanges);
        assert_eq!(document.mutations[0].name, "login");
        assert_eq!(document.queries[0].type_ref, JSON_SCALAR);
        assert!(document.sdl.contains("type Mutation {"));
        assert!(document.sdl.ends_with("scalar JSON\n"));
    }

    #[test]
    fn test_errors_without_data_skipped() {
        let exchanges = vec![graphql(
            json!({"query": "{ me { id } }"}),
            json!({"errors": [{"message": "denied"}]}),
        )];
        let document = GraphqlInferrer::default().infer_exchanges(&exchanges);
        assert!(document.is_empty());
        assert_eq!(document.sample_count, 0);
        assert_eq!(document.sdl, "");
    }
}
