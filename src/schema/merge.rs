//! Cross-sample schema merging

use std::collections::{BTreeMap, BTreeSet};

use super::{MergeStrategy, SchemaNode};

/// Merge two nodes with the default (widening) strategy
#[must_use]
pub fn merge(a: &SchemaNode, b: &SchemaNode) -> SchemaNode {
    Merger::default().merge(a, b)
}

/// Schema merger parameterised by how kind conflicts are resolved
#[derive(Debug, Clone, Copy, Default)]
pub struct Merger {
    strategy: MergeStrategy,
}

impl Merger {
    /// Create a merger
    #[must_use]
    pub fn new(strategy: MergeStrategy) -> Self {
        Self { strategy }
    }

    /// Strategy in use
    #[must_use]
    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Reduce nodes left to right; `None` for an empty input
    pub fn merge_all<I>(&self, nodes: I) -> Option<SchemaNode>
    where
        I: IntoIterator<Item = SchemaNode>,
    {
        nodes.into_iter().reduce(|acc, node| self.merge(&acc, &node))
    }

    /// Merge two nodes inferred for the same logical field
    ///
    /// Null is the identity. Integer and number meet at number. Objects union
    /// their fields and intersect their required sets; an object absorbs an
    /// array. Any other disagreement is resolved by the strategy.
    #[must_use]
    pub fn merge(&self, a: &SchemaNode, b: &SchemaNode) -> SchemaNode {
        use SchemaNode as N;

        match (a, b) {
            (N::Null, other) | (other, N::Null) => other.clone(),
            (N::Union { .. }, _) | (_, N::Union { .. }) => self.merge_with_union(a, b),
            (N::Boolean, N::Boolean) => N::Boolean,
            (N::Integer, N::Integer) => N::Integer,
            (N::Integer | N::Number, N::Integer | N::Number) => N::Number,
            (N::String { format: fa }, N::String { format: fb }) => N::String {
                format: if fa == fb { *fa } else { None },
            },
            (N::Array { items: ia }, N::Array { items: ib }) => N::array_of(self.merge(ia, ib)),
            (
                N::Object {
                    properties: pa,
                    required: ra,
                },
                N::Object {
                    properties: pb,
                    required: rb,
                },
            ) => self.merge_objects(pa, ra, pb, rb),
            (object @ N::Object { .. }, N::Array { .. })
            | (N::Array { .. }, object @ N::Object { .. }) => object.clone(),
            _ => self.conflict(a, b),
        }
    }

    fn merge_objects(
        &self,
        pa: &BTreeMap<String, SchemaNode>,
        ra: &BTreeSet<String>,
        pb: &BTreeMap<String, SchemaNode>,
        rb: &BTreeSet<String>,
    ) -> SchemaNode {
        let mut properties = pa.clone();
        for (name, node) in pb {
            let merged = match properties.get(name) {
                Some(existing) => self.merge(existing, node),
                None => node.clone(),
            };
            properties.insert(name.clone(), merged);
        }

        // a field missing from either sample is never required
        let required = ra
            .intersection(rb)
            .filter(|name| pa.contains_key(*name) && pb.contains_key(*name))
            .cloned()
            .collect();

        SchemaNode::Object {
            properties,
            required,
        }
    }

    fn conflict(&self, a: &SchemaNode, b: &SchemaNode) -> SchemaNode {
        match self.strategy {
            MergeStrategy::Widen => SchemaNode::string(),
            MergeStrategy::Union => self.union_of([a, b]),
        }
    }

    fn merge_with_union(&self, a: &SchemaNode, b: &SchemaNode) -> SchemaNode {
        match self.strategy {
            MergeStrategy::Union => self.union_of([a, b]),
            MergeStrategy::Widen => {
                // collapse every variant into one node
                variants([a, b])
                    .into_iter()
                    .reduce(|acc, v| self.merge(&acc, &v))
                    .unwrap_or(SchemaNode::Null)
            }
        }
    }

    /// Union node holding at most one variant per kind
    ///
    /// Arrays and objects share a slot so an object absorbs an array here too.
    fn union_of<'a>(&self, nodes: impl IntoIterator<Item = &'a SchemaNode>) -> SchemaNode {
        let mut members: Vec<SchemaNode> = Vec::new();

        for variant in variants(nodes) {
            match members
                .iter_mut()
                .find(|m| shares_slot(m, &variant))
            {
                Some(member) => *member = self.merge(member, &variant),
                None => members.push(variant),
            }
        }

        members.sort_by_key(SchemaNode::kind_rank);
        if members.len() == 1 {
            members.pop().unwrap_or(SchemaNode::Null)
        } else {
            SchemaNode::Union { one_of: members }
        }
    }
}

fn shares_slot(a: &SchemaNode, b: &SchemaNode) -> bool {
    use SchemaNode as N;
    a.kind_rank() == b.kind_rank()
        || matches!(
            (a, b),
            (N::Array { .. }, N::Object { .. }) | (N::Object { .. }, N::Array { .. })
        )
}

/// Flatten nested unions and drop nulls
fn variants<'a>(nodes: impl IntoIterator<Item = &'a SchemaNode>) -> Vec<SchemaNode> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            SchemaNode::Null => {}
            SchemaNode::Union { one_of } => out.extend(variants(one_of)),
            other => out.push(other.clone()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{infer, StringFormat};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    #[test]
    fn test_age_scenario_widens_to_string() {
        let a = infer(&json!({"age": 5}));
        let b = infer(&json!({"age": "unknown"}));
        let merged = merge(&a, &b);
        assert_eq!(merged.property("age"), Some(&SchemaNode::string()));
        assert!(merged.is_required("age"));
    }

    #[test]
    fn test_union_strategy_keeps_both_kinds() {
        let merger = Merger::new(MergeStrategy::Union);
        let merged = merger.merge(&infer(&json!({"age": 5})), &infer(&json!({"age": "unknown"})));
        assert_eq!(
            merged.property("age"),
            Some(&SchemaNode::Union {
                one_of: vec![SchemaNode::Integer, SchemaNode::string()]
            })
        );
    }

    #[test]
    fn test_union_absorbs_same_kind() {
        let merger = Merger::new(MergeStrategy::Union);
        let union = merger.merge(&SchemaNode::Integer, &SchemaNode::Boolean);
        let merged = merger.merge(&union, &SchemaNode::Number);
        assert_eq!(
            merged,
            SchemaNode::Union {
                one_of: vec![SchemaNode::Boolean, SchemaNode::Number]
            }
        );
    }

    #[test]
    fn test_required_is_intersection() {
        let a = infer(&json!({"id": 1, "name": "x"}));
        let b = infer(&json!({"id": 2}));
        let merged = merge(&a, &b);
        assert!(merged.is_required("id"));
        assert!(!merged.is_required("name"));
        assert!(merged.property("name").is_some());
    }

    #[test]
    fn test_null_is_identity() {
        let a = infer(&json!({"tag": null}));
        let b = infer(&json!({"tag": "x@y.io"}));
        let merged = merge(&a, &b);
        assert_eq!(
            merged.property("tag"),
            Some(&SchemaNode::formatted(StringFormat::Email))
        );
        // null in one sample keeps the field optional
        assert!(!merged.is_required("tag"));
    }

    #[test]
    fn test_numeric_and_format_rules() {
        assert_eq!(merge(&SchemaNode::Integer, &SchemaNode::Number), SchemaNode::Number);
        assert_eq!(
            merge(
                &SchemaNode::formatted(StringFormat::Email),
                &SchemaNode::formatted(StringFormat::Uuid)
            ),
            SchemaNode::string()
        );
        assert_eq!(
            merge(
                &SchemaNode::formatted(StringFormat::Uuid),
                &SchemaNode::formatted(StringFormat::Uuid)
            ),
            SchemaNode::formatted(StringFormat::Uuid)
        );
    }

    #[test]
    fn test_arrays_merge_items() {
        let a = infer(&json!([{"x": 1}]));
        let b = infer(&json!([{"x": 2.5, "y": true}]));
        let merged = merge(&a, &b);
        let SchemaNode::Array { items } = merged else {
            panic!("expected array");
        };
        assert_eq!(items.property("x"), Some(&SchemaNode::Number));
        assert!(!items.is_required("y"));
    }

    #[test]
    fn test_object_absorbs_array() {
        let object = infer(&json!({"a": 1}));
        let array = infer(&json!([1]));
        assert_eq!(merge(&object, &array), object);
        assert_eq!(merge(&array, &object), object);
    }

    #[test]
    fn test_union_object_absorbs_array_in_any_order() {
        let merger = Merger::new(MergeStrategy::Union);
        let array = infer(&json!([1]));
        let string = SchemaNode::string();
        let object = infer(&json!({"a": 1}));

        let left = merger.merge(&merger.merge(&array, &string), &object);
        let right = merger.merge(&array, &merger.merge(&string, &object));
        let expected = SchemaNode::Union {
            one_of: vec![string.clone(), object.clone()],
        };
        assert_eq!(left, expected);
        assert_eq!(right, expected);
    }

    #[test]
    fn test_merge_all_left_to_right() {
        let merger = Merger::default();
        assert!(merger.merge_all(Vec::new()).is_none());
        let merged = merger
            .merge_all(vec![
                infer(&json!({"a": 1, "b": 1})),
                infer(&json!({"a": 1, "b": 1})),
                infer(&json!({"a": 1})),
            ])
            .unwrap();
        assert!(merged.is_required("a"));
        assert!(!merged.is_required("b"));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            (-1000.0f64..1000.0).prop_map(|f| json!(f)),
            prop_oneof![
                Just("a@b.com".to_string()),
                Just("2024-01-01".to_string()),
                "[a-z]{0,6}",
            ]
            .prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
                prop::collection::btree_map("[a-d]", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn required_everywhere(node: &SchemaNode, a: &SchemaNode, b: &SchemaNode) -> bool {
        match node {
            SchemaNode::Object {
                properties,
                required,
            } => {
                required.iter().all(|name| a.is_required(name) && b.is_required(name))
                    && properties.iter().all(|(name, child)| {
                        match (a.property(name), b.property(name)) {
                            (
                                Some(ca @ SchemaNode::Object { .. }),
                                Some(cb @ SchemaNode::Object { .. }),
                            ) => required_everywhere(child, ca, cb),
                            _ => true,
                        }
                    })
            }
            _ => true,
        }
    }

    proptest! {
        #[test]
        fn prop_union_merge_associative(a in arb_json(), b in arb_json(), c in arb_json()) {
            let union = Merger::new(MergeStrategy::Union);
            let (sa, sb, sc) = (infer(&a), infer(&b), infer(&c));
            prop_assert_eq!(
                union.merge(&union.merge(&sa, &sb), &sc),
                union.merge(&sa, &union.merge(&sb, &sc))
            );
        }

        #[test]
        fn prop_merge_commutative(a in arb_json(), b in arb_json()) {
            let (sa, sb) = (infer(&a), infer(&b));
            prop_assert_eq!(merge(&sa, &sb), merge(&sb, &sa));

            let union = Merger::new(MergeStrategy::Union);
            prop_assert_eq!(union.merge(&sa, &sb), union.merge(&sb, &sa));
        }

        #[test]
        fn prop_required_only_when_required_in_both(a in arb_json(), b in arb_json()) {
            let wrap_a = json!({"root": a});
            let wrap_b = json!({"root": b});
            let (sa, sb) = (infer(&wrap_a), infer(&wrap_b));
            let merged = merge(&sa, &sb);
            prop_assert!(required_everywhere(&merged, &sa, &sb));
        }
    }
}
