//! Structural schema inference over observed JSON samples
//!
//! [`infer`] turns one sample into a [`SchemaNode`]; [`merge`] folds the nodes
//! inferred from several samples of the same logical field into one. The
//! OpenAPI-style and GraphQL-style extractors are both built on these two
//! operations.

pub mod diff;
pub mod graphql;
mod infer;
mod merge;
pub mod openapi;

pub use diff::{diff_documents, ChangeKind, FieldChange, SchemaDiff};
pub use graphql::{GraphqlDocument, GraphqlInferrer, OperationType};
pub use infer::{detect_format, infer, Inferrer, DEFAULT_MAX_DEPTH};
pub use merge::{merge, Merger};
pub use openapi::{SchemaDocument, SchemaExtractor};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic format of a string value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringFormat {
    /// RFC 4122 UUID
    Uuid,
    /// ISO 8601 date-time
    DateTime,
    /// ISO 8601 calendar date
    Date,
    /// Email address
    Email,
    /// Absolute URI
    Uri,
    /// Phone number
    Phone,
}

impl fmt::Display for StringFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uuid => "uuid",
            Self::DateTime => "date-time",
            Self::Date => "date",
            Self::Email => "email",
            Self::Uri => "uri",
            Self::Phone => "phone",
        };
        f.write_str(name)
    }
}

/// Recursive structural type inferred from samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SchemaNode {
    /// JSON null
    Null,
    /// true/false
    Boolean,
    /// Whole number
    Integer,
    /// Any number
    Number,
    /// String with an optional semantic format
    String {
        /// Detected format
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<StringFormat>,
    },
    /// Homogeneous list
    Array {
        /// Item schema
        items: Box<SchemaNode>,
    },
    /// Object with named fields
    Object {
        /// Field schemas
        #[serde(default)]
        properties: BTreeMap<String, SchemaNode>,
        /// Fields present and non-null in every sample
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        required: BTreeSet<String>,
    },
    /// Alternatives kept apart by the union merge strategy
    Union {
        /// Variants, one per kind
        #[serde(rename = "oneOf")]
        one_of: Vec<SchemaNode>,
    },
}

impl SchemaNode {
    /// Plain string node
    #[must_use]
    pub fn string() -> Self {
        Self::String { format: None }
    }

    /// String node with a format
    #[must_use]
    pub fn formatted(format: StringFormat) -> Self {
        Self::String {
            format: Some(format),
        }
    }

    /// Object node without fields
    #[must_use]
    pub fn empty_object() -> Self {
        Self::Object {
            properties: BTreeMap::new(),
            required: BTreeSet::new(),
        }
    }

    /// Array node
    #[must_use]
    pub fn array_of(items: SchemaNode) -> Self {
        Self::Array {
            items: Box::new(items),
        }
    }

    /// Kind name without detail (`"string"`, `"object"`, ...)
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String { .. } => "string",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
            Self::Union { .. } => "union",
        }
    }

    /// Rank used to order union variants deterministically
    pub(crate) fn kind_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean => 1,
            Self::Integer | Self::Number => 2,
            Self::String { .. } => 3,
            Self::Array { .. } => 4,
            Self::Object { .. } => 5,
            Self::Union { .. } => 6,
        }
    }

    /// Property schema of an object node
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&SchemaNode> {
        match self {
            Self::Object { properties, .. } => properties.get(name),
            _ => None,
        }
    }

    /// Whether an object node marks `name` as required
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        match self {
            Self::Object { required, .. } => required.contains(name),
            _ => false,
        }
    }
}

impl fmt::Display for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String {
                format: Some(format),
            } => write!(f, "string({format})"),
            Self::Array { items } => write!(f, "array<{items}>"),
            Self::Union { one_of } => {
                let names: Vec<String> = one_of.iter().map(ToString::to_string).collect();
                write!(f, "{}", names.join(" | "))
            }
            other => f.write_str(other.kind_name()),
        }
    }
}

/// What to do when two samples disagree on a field's kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Degrade to a plain string (lossy)
    #[default]
    Widen,
    /// Keep each kind as a variant of a union node
    Union,
}
