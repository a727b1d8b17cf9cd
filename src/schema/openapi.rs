//! OpenAPI-style schema document extraction

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{detect_format, Inferrer, Merger, SchemaNode, StringFormat};
use crate::config::{LimitsConfig, SchemaConfig};
use crate::endpoint::{self, EndpointKey, SegmentKind};
use crate::session::{RecordedExchange, RecordingSession};
use crate::wire;
use crate::Result;

/// Status key used for exchanges without a recorded status
pub const DEFAULT_RESPONSE: &str = "default";

/// Inferred description of every observed endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    /// Path template, then lower-cased method
    pub paths: BTreeMap<String, BTreeMap<String, Operation>>,
    /// Security schemes hinted at by request headers and query keys
    #[serde(default)]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
}

/// One method on one path template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Stable identifier derived from method and template
    pub operation_id: String,
    /// `METHOD /template`
    pub summary: String,
    /// Path and query parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Merged request body schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<SchemaNode>,
    /// Response schemas by status code
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseSpec>,
    /// Names of the security schemes seen on this operation
    #[serde(default)]
    pub security: Vec<String>,
    /// Exchanges grouped under this operation
    pub sample_count: usize,
}

/// Responses observed for one status code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSpec {
    /// First declared content type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Merged body schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaNode>,
    /// Exchanges that returned this status
    pub sample_count: usize,
}

/// Where a parameter is carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// Path segment
    Path,
    /// Query string
    Query,
    /// Request header
    Header,
}

/// Operation parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Location
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    /// Present on every observed exchange
    pub required: bool,
    /// Value schema
    pub schema: SchemaNode,
    /// First observed value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// Authentication scheme hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SecurityScheme {
    /// `Authorization: Bearer ...`
    Bearer,
    /// `Authorization: Basic ...`
    Basic,
    /// API key in a header or query parameter
    ApiKey {
        /// Where the key is sent
        #[serde(rename = "in")]
        location: ParameterLocation,
        /// Header or query name
        name: String,
    },
}

const BEARER_SCHEME: &str = "bearerAuth";
const BASIC_SCHEME: &str = "basicAuth";

impl SchemaDocument {
    /// Parse a previously exported document
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a schema document
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a previously exported document
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Operation for an endpoint
    #[must_use]
    pub fn operation(&self, key: &EndpointKey) -> Option<&Operation> {
        self.paths
            .get(&key.template)?
            .get(&key.method.to_ascii_lowercase())
    }

    /// All endpoints in path then method order
    pub fn endpoints(&self) -> impl Iterator<Item = (EndpointKey, &Operation)> + '_ {
        self.paths.iter().flat_map(|(template, methods)| {
            methods.iter().map(move |(method, op)| {
                (
                    EndpointKey {
                        method: method.to_ascii_uppercase(),
                        template: template.clone(),
                    },
                    op,
                )
            })
        })
    }

    /// Number of operations
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.paths.values().map(BTreeMap::len).sum()
    }
}

/// Builds a [`SchemaDocument`] from a session
#[derive(Debug, Clone)]
pub struct SchemaExtractor {
    inferrer: Inferrer,
    merger: Merger,
    max_body_size: usize,
}

impl Default for SchemaExtractor {
    fn default() -> Self {
        Self::new(&SchemaConfig::default(), &LimitsConfig::default())
    }
}

impl SchemaExtractor {
    /// Create an extractor from configuration
    #[must_use]
    pub fn new(schema: &SchemaConfig, limits: &LimitsConfig) -> Self {
        Self {
            inferrer: Inferrer::new(schema.max_depth),
            merger: Merger::new(schema.merge_strategy),
            max_body_size: limits.max_body_size,
        }
    }

    /// Extract the document for every endpoint in a session
    #[must_use]
    pub fn extract(&self, session: &RecordingSession) -> SchemaDocument {
        self.extract_exchanges(&session.requests)
    }

    /// Extract the document for a list of exchanges
    #[must_use]
    pub fn extract_exchanges(&self, exchanges: &[RecordedExchange]) -> SchemaDocument {
        let mut document = SchemaDocument::default();

        for (key, group) in endpoint::group_exchanges(exchanges) {
            let (operation, schemes) = self.operation(&key, &group);
            document.security_schemes.extend(schemes);
            document
                .paths
                .entry(key.template.clone())
                .or_default()
                .insert(key.method.to_ascii_lowercase(), operation);
        }

        debug!(
            "Extracted {} operations, {} security schemes",
            document.operation_count(),
            document.security_schemes.len()
        );
        document
    }

    fn operation(
        &self,
        key: &EndpointKey,
        group: &[&RecordedExchange],
    ) -> (Operation, BTreeMap<String, SecurityScheme>) {
        let request_body = self
            .merger
            .merge_all(group.iter().filter_map(|e| self.request_schema(e)));

        let mut responses: BTreeMap<String, (ResponseSpec, Vec<SchemaNode>)> = BTreeMap::new();
        for exchange in group {
            let status = exchange
                .status
                .map_or_else(|| DEFAULT_RESPONSE.to_string(), |s| s.to_string());
            let (spec, samples) = responses.entry(status).or_default();
            spec.sample_count += 1;
            if spec.content_type.is_none() {
                spec.content_type = exchange.response_content_type().map(str::to_string);
            }
            if let Some(node) = self.response_schema(exchange) {
                samples.push(node);
            }
        }
        let responses = responses
            .into_iter()
            .map(|(status, (mut spec, samples))| {
                spec.schema = self.merger.merge_all(samples);
                (status, spec)
            })
            .collect();

        let mut parameters = path_parameters(group);
        parameters.extend(query_parameters(group));

        let schemes = security_schemes(group);
        let operation = Operation {
            operation_id: operation_id(key),
            summary: key.to_string(),
            parameters,
            request_body,
            responses,
            security: schemes.keys().cloned().collect(),
            sample_count: group.len(),
        };

        (operation, schemes)
    }

    fn request_schema(&self, exchange: &RecordedExchange) -> Option<SchemaNode> {
        if let Some(bytes) = exchange.request_bytes() {
            return self.wire_schema(&exchange.id, &bytes);
        }
        let body = exchange.request_json()?;
        self.json_schema(&exchange.id, &body)
    }

    fn response_schema(&self, exchange: &RecordedExchange) -> Option<SchemaNode> {
        if let Some(bytes) = exchange.response_bytes() {
            return self.wire_schema(&exchange.id, &bytes);
        }
        let body = exchange.response_json()?;
        self.json_schema(&exchange.id, &body)
    }

    fn json_schema(&self, id: &str, body: &Value) -> Option<SchemaNode> {
        let size = serde_json::to_vec(body).map_or(usize::MAX, |v| v.len());
        if size > self.max_body_size {
            debug!("Skipping {size} byte body of exchange {id}");
            return None;
        }
        Some(self.inferrer.infer(body))
    }

    fn wire_schema(&self, id: &str, bytes: &[u8]) -> Option<SchemaNode> {
        if bytes.len() > self.max_body_size {
            debug!("Skipping {} byte binary body of exchange {id}", bytes.len());
            return None;
        }
        let decoded = wire::decode(bytes);
        if !decoded.success {
            debug!(
                "Binary body of exchange {id} did not decode: {}",
                decoded.error.as_deref().unwrap_or("no fields")
            );
            return None;
        }
        Some(self.inferrer.infer_wire(&decoded.fields))
    }
}

/// `get` + PascalCase template segments, placeholders as `By<Name>`
#[must_use]
pub fn operation_id(key: &EndpointKey) -> String {
    let mut id = key.method.to_ascii_lowercase();

    let mut any_segment = false;
    for segment in key.template.split('/').filter(|s| !s.is_empty()) {
        any_segment = true;
        if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            id.push_str("By");
            id.push_str(&pascal_case(name));
        } else {
            id.push_str(&pascal_case(segment));
        }
    }
    if !any_segment {
        id.push_str("Root");
    }

    id
}

/// Split on non-alphanumerics and capitalize each word
pub(crate) fn pascal_case(text: &str) -> String {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + chars.as_str()
            })
        })
        .collect()
}

fn path_parameters(group: &[&RecordedExchange]) -> Vec<Parameter> {
    let Some(url) = group.iter().find_map(|e| e.parsed_url()) else {
        return Vec::new();
    };

    endpoint::path_parameters(url.path())
        .into_iter()
        .map(|param| Parameter {
            schema: match param.kind {
                SegmentKind::Integer => SchemaNode::Integer,
                SegmentKind::Uuid => SchemaNode::formatted(StringFormat::Uuid),
                SegmentKind::ObjectId => SchemaNode::string(),
            },
            name: param.name,
            location: ParameterLocation::Path,
            required: true,
            example: Some(param.sample),
        })
        .collect()
}

fn query_parameters(group: &[&RecordedExchange]) -> Vec<Parameter> {
    endpoint::query_parameters(group)
        .into_iter()
        .map(|param| Parameter {
            schema: query_value_schema(&param.examples),
            example: param.examples.first().cloned(),
            name: param.name,
            location: ParameterLocation::Query,
            required: param.required,
        })
        .collect()
}

/// Narrowest scalar schema that fits every observed query value
fn query_value_schema(examples: &[String]) -> SchemaNode {
    let scalar = |text: &str| {
        if text.parse::<i64>().is_ok() {
            SchemaNode::Integer
        } else if text.parse::<f64>().is_ok_and(f64::is_finite) {
            SchemaNode::Number
        } else if text == "true" || text == "false" {
            SchemaNode::Boolean
        } else {
            SchemaNode::String {
                format: detect_format(text),
            }
        }
    };

    Merger::default()
        .merge_all(examples.iter().map(|e| scalar(e)))
        .unwrap_or_else(SchemaNode::string)
}

fn is_api_key_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("api") && lower.contains("key")
}

fn security_schemes(group: &[&RecordedExchange]) -> BTreeMap<String, SecurityScheme> {
    let mut schemes = BTreeMap::new();
    let mut query_keys = BTreeSet::new();

    for exchange in group {
        if let Some(auth) = exchange.request_header("authorization") {
            let lower = auth.trim_start().to_ascii_lowercase();
            if lower.starts_with("bearer ") {
                schemes.insert(BEARER_SCHEME.to_string(), SecurityScheme::Bearer);
            } else if lower.starts_with("basic ") {
                schemes.insert(BASIC_SCHEME.to_string(), SecurityScheme::Basic);
            }
        }

        for name in exchange.request_headers.keys() {
            if is_api_key_name(name) {
                schemes.insert(
                    name.clone(),
                    SecurityScheme::ApiKey {
                        location: ParameterLocation::Header,
                        name: name.clone(),
                    },
                );
            }
        }

        if let Some(url) = exchange.parsed_url() {
            for (key, _) in url.query_pairs() {
                if is_api_key_name(&key) {
                    query_keys.insert(key.into_owned());
                }
            }
        }
    }

    for name in query_keys {
        schemes
            .entry(name.clone())
            .or_insert(SecurityScheme::ApiKey {
                location: ParameterLocation::Query,
                name,
            });
    }

    schemes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MergeStrategy;
    use serde_json::json;

    fn exchange(method: &str, url: &str, status: u16, body: Value) -> RecordedExchange {
        let mut e = RecordedExchange::new(method, url);
        e.status = Some(status);
        e.response_body = Some(body);
        e.content_type = Some("application/json".to_string());
        e
    }

    #[test]
    fn test_operation_id() {
        assert_eq!(
            operation_id(&EndpointKey::new("GET", "/api/users/42")),
            "getApiUsersById"
        );
        assert_eq!(
            operation_id(&EndpointKey::new("post", "/v1/order-items/7/refund/8")),
            "postV1OrderItemsByIdRefundById2"
        );
        assert_eq!(operation_id(&EndpointKey::new("GET", "/")), "getRoot");
    }

    #[test]
    fn test_extract_user_scenario() {
        let session = RecordingSession {
            requests: vec![exchange(
                "GET",
                "https://api.test/api/users/42",
                200,
                json!({"id": 42, "email": "a@b.com", "createdAt": "2024-01-01T00:00:00Z"}),
            )],
            ..RecordingSession::default()
        };

        let document = SchemaExtractor::default().extract(&session);
        let op = document
            .operation(&EndpointKey::new("GET", "/api/users/1"))
            .unwrap();
        assert_eq!(op.operation_id, "getApiUsersById");
        assert_eq!(op.sample_count, 1);

        let schema = op.responses["200"].schema.as_ref().unwrap();
        assert_eq!(schema.property("id"), Some(&SchemaNode::Integer));
        assert_eq!(
            schema.property("email"),
            Some(&SchemaNode::formatted(StringFormat::Email))
        );
        assert_eq!(
            op.responses["200"].content_type.as_deref(),
            Some("application/json")
        );

        let id = &op.parameters[0];
        assert_eq!(id.name, "id");
        assert_eq!(id.location, ParameterLocation::Path);
        assert!(id.required);
        assert_eq!(id.schema, SchemaNode::Integer);
        assert_eq!(id.example.as_deref(), Some("42"));
    }

    #[test]
    fn test_responses_partitioned_by_status() {
        let exchanges = vec![
            exchange("GET", "/items/1", 200, json!({"name": "a"})),
            exchange("GET", "/items/2", 404, json!({"error": "missing"})),
            exchange("GET", "/items/3", 200, json!({"name": "b", "tag": "x"})),
        ];
        let document = SchemaExtractor::default().extract_exchanges(&exchanges);
        let op = document
            .operation(&EndpointKey::new("GET", "/items/9"))
            .unwrap();

        assert_eq!(op.responses.len(), 2);
        assert_eq!(op.responses["200"].sample_count, 2);
        let ok = op.responses["200"].schema.as_ref().unwrap();
        assert!(ok.is_required("name"));
        assert!(!ok.is_required("tag"));
        assert!(op.responses["404"]
            .schema
            .as_ref()
            .unwrap()
            .property("error")
            .is_some());
    }

    #[test]
    fn test_request_bodies_merge_with_strategy() {
        let mut a = RecordedExchange::new("POST", "/profile");
        a.request_body = Some(json!({"age": 5}));
        let mut b = RecordedExchange::new("POST", "/profile");
        b.request_body = Some(json!("{\"age\": \"unknown\"}"));
        let exchanges = vec![a, b];

        let widened = SchemaExtractor::default().extract_exchanges(&exchanges);
        let body = widened
            .operation(&EndpointKey::new("POST", "/profile"))
            .and_then(|op| op.request_body.clone())
            .unwrap();
        assert_eq!(body.property("age"), Some(&SchemaNode::string()));

        let config = SchemaConfig {
            merge_strategy: MergeStrategy::Union,
            ..SchemaConfig::default()
        };
        let union = SchemaExtractor::new(&config, &LimitsConfig::default())
            .extract_exchanges(&exchanges);
        let body = union
            .operation(&EndpointKey::new("POST", "/profile"))
            .and_then(|op| op.request_body.clone())
            .unwrap();
        assert!(matches!(body.property("age"), Some(SchemaNode::Union { .. })));
        // no status recorded
        assert!(union.paths["/profile"]["post"]
            .responses
            .contains_key(DEFAULT_RESPONSE));
    }

    #[test]
    fn test_oversized_and_malformed_bodies_skipped() {
        let limits = LimitsConfig {
            max_body_size: 16,
            ..LimitsConfig::default()
        };
        let extractor = SchemaExtractor::new(&SchemaConfig::default(), &limits);
        let exchanges = vec![
            exchange("GET", "/big", 200, json!({"payload": "0123456789abcdef"})),
            exchange("GET", "/big", 200, json!("{broken")),
        ];
        let document = extractor.extract_exchanges(&exchanges);
        let op = &document.paths["/big"]["get"];
        assert_eq!(op.responses["200"].sample_count, 2);
        assert!(op.responses["200"].schema.is_none());
    }

    #[test]
    fn test_binary_response_uses_wire_decoder() {
        let mut e = RecordedExchange::new("POST", "/rpc/GetUser");
        e.status = Some(200);
        e.content_type = Some("application/grpc+proto".to_string());
        // field 1 varint 150, field 2 "hi"
        e.response_body = Some(json!("CJYBEgJoaQ=="));

        let document = SchemaExtractor::default().extract_exchanges(&[e]);
        let schema = document.paths["/rpc/GetUser"]["post"].responses["200"]
            .schema
            .clone()
            .unwrap();
        assert_eq!(schema.property("field_1"), Some(&SchemaNode::Integer));
        assert_eq!(schema.property("field_2"), Some(&SchemaNode::string()));
    }

    #[test]
    fn test_query_parameters_and_security() {
        let mut a = RecordedExchange::new("GET", "https://api.test/search?q=shoes&page=1&api_key=k1");
        a.request_headers
            .insert("Authorization".to_string(), "Bearer t0k3n".to_string());
        a.request_headers
            .insert("X-Api-Key".to_string(), "secret".to_string());
        let b = RecordedExchange::new("GET", "https://api.test/search?q=hats&page=2");
        let document = SchemaExtractor::default().extract_exchanges(&[a, b]);
        let op = &document.paths["/search"]["get"];

        let page = op.parameters.iter().find(|p| p.name == "page").unwrap();
        assert_eq!(page.location, ParameterLocation::Query);
        assert_eq!(page.schema, SchemaNode::Integer);
        assert!(page.required);
        let key = op.parameters.iter().find(|p| p.name == "api_key").unwrap();
        assert!(!key.required);

        assert_eq!(document.security_schemes[BEARER_SCHEME], SecurityScheme::Bearer);
        assert_eq!(
            document.security_schemes["X-Api-Key"],
            SecurityScheme::ApiKey {
                location: ParameterLocation::Header,
                name: "X-Api-Key".to_string()
            }
        );
        assert!(matches!(
            document.security_schemes["api_key"],
            SecurityScheme::ApiKey {
                location: ParameterLocation::Query,
                ..
            }
        ));
        assert_eq!(op.security.len(), 3);
    }

    #[test]
    fn test_document_json_roundtrip() {
        let exchanges = vec![exchange("GET", "/a/1", 200, json!({"x": [1, 2]}))];
        let document = SchemaExtractor::default().extract_exchanges(&exchanges);
        let text = serde_json::to_string(&document).unwrap();
        assert!(text.contains("\"operationId\":\"getAById\""));
        assert_eq!(SchemaDocument::from_json_str(&text).unwrap(), document);
        assert_eq!(document.endpoints().count(), 1);
    }
}
