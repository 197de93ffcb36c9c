//! # Canonicalizer
//!
//! Converts an entity's field map into an order-independent form so that a
//! desired spec and a live entity compare equal whenever they mean the same
//! thing. Object keys are sorted at every level, `null` fields are dropped
//! (an absent optional and an explicit empty one are the same), and arrays
//! keep their element order.
//!
//! Equality of two [`CanonicalForm`]s is the only no-op test the entity
//! reconcilers use. [`CanonicalForm::diff`] renders the field-level change
//! set logged on modify.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::Result;

/// Recursively normalise a JSON value.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// The canonical field map of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalForm(Value);

impl CanonicalForm {
    /// Canonicalize any serializable entity
    pub fn of<T: Serialize + ?Sized>(entity: &T) -> Result<Self> {
        Ok(Self(canonicalize(serde_json::to_value(entity)?)))
    }

    /// Remove top-level fields excluded from comparison
    pub fn without(mut self, keys: &[&str]) -> Self {
        if let Value::Object(map) = &mut self.0 {
            for key in keys {
                map.remove(*key);
            }
        }
        self
    }

    /// Set a top-level field, canonicalizing the value
    pub fn with<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Result<Self> {
        let value = canonicalize(serde_json::to_value(value)?);
        if let Value::Object(map) = &mut self.0 {
            if value.is_null() {
                map.remove(key);
            } else {
                map.insert(key.to_string(), value);
            }
        }
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Field-level changes turning `self` (live) into `desired`.
    pub fn diff(&self, desired: &CanonicalForm) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        diff_values(String::new(), Some(&self.0), Some(&desired.0), &mut changes);
        changes
    }
}

impl From<Value> for CanonicalForm {
    fn from(value: Value) -> Self {
        Self(canonicalize(value))
    }
}

/// One changed leaf (or whole subtree) between two canonical forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |v: &Option<Value>| {
            v.as_ref().map_or_else(|| "<absent>".to_string(), Value::to_string)
        };
        write!(f, "{}: {} -> {}", self.path, render(&self.before), render(&self.after))
    }
}

/// Render a change list on one line for log fields.
pub fn format_changes(changes: &[FieldChange]) -> String {
    changes.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn diff_values(
    path: String,
    before: Option<&Value>,
    after: Option<&Value>,
    out: &mut Vec<FieldChange>,
) {
    match (before, after) {
        (Some(Value::Object(b)), Some(Value::Object(a))) => {
            let mut keys: Vec<&String> = b.keys().chain(a.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                diff_values(join(&path, key), b.get(key), a.get(key), out);
            }
        }
        (Some(Value::Array(b)), Some(Value::Array(a))) if b.len() == a.len() => {
            for (idx, (bv, av)) in b.iter().zip(a.iter()).enumerate() {
                diff_values(format!("{}[{}]", path, idx), Some(bv), Some(av), out);
            }
        }
        (b, a) if b != a => {
            out.push(FieldChange { path, before: b.cloned(), after: a.cloned() });
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(CanonicalForm::from(a), CanonicalForm::from(b));
    }

    #[test]
    fn test_nulls_dropped_and_arrays_ordered() {
        let a = CanonicalForm::from(json!({
            "ssl_policy": null,
            "certificates": [{"arn": "1"}, {"arn": "2"}]
        }));
        let b = CanonicalForm::from(json!({"certificates": [{"arn": "1"}, {"arn": "2"}]}));
        let reversed = CanonicalForm::from(json!({"certificates": [{"arn": "2"}, {"arn": "1"}]}));
        assert_eq!(a, b);
        assert_ne!(a, reversed);
    }

    #[test]
    fn test_without_and_with() {
        let form = CanonicalForm::from(json!({"rule_arn": "x", "priority": 3, "actions": []}))
            .without(&["rule_arn", "priority"])
            .with("conditions", &Vec::<String>::new())
            .unwrap();
        assert_eq!(form.as_value(), &json!({"actions": [], "conditions": []}));
    }

    #[test]
    fn test_diff_paths() {
        let live = CanonicalForm::from(json!({
            "health_check": {"path": "/", "interval_seconds": 30},
            "port": 80
        }));
        let desired = CanonicalForm::from(json!({
            "health_check": {"path": "/health", "interval_seconds": 30},
            "port": 80
        }));
        let changes = live.diff(&desired);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to_string(), r#"health_check.path: "/" -> "/health""#);
        assert!(live.diff(&live).is_empty());
    }

    #[test]
    fn test_diff_added_and_removed_fields() {
        let live = CanonicalForm::from(json!({"values": ["a"]}));
        let desired = CanonicalForm::from(json!({"values": ["a", "b"], "extra": true}));
        let changes = live.diff(&desired);
        let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["extra", "values"]);
        assert_eq!(changes[0].before, None);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,4}", inner), 0..5)
                    .prop_map(|pairs| Value::Object(pairs.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_canonicalization_is_idempotent(value in arb_json()) {
            let once = canonicalize(value);
            prop_assert_eq!(canonicalize(once.clone()), once);
        }

        #[test]
        fn prop_key_insertion_order_is_irrelevant(
            pairs in prop::collection::vec(("[a-z]{1,4}", any::<i32>()), 0..8)
        ) {
            let mut seen = std::collections::HashSet::new();
            let unique: Vec<(String, i32)> =
                pairs.into_iter().filter(|(k, _)| seen.insert(k.clone())).collect();
            let forward: Map<String, Value> =
                unique.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let backward: Map<String, Value> =
                unique.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
            prop_assert_eq!(
                CanonicalForm::from(Value::Object(forward)),
                CanonicalForm::from(Value::Object(backward))
            );
        }

        #[test]
        fn prop_diff_is_empty_iff_equal(a in arb_json(), b in arb_json()) {
            let a = CanonicalForm::from(json!({"v": a}));
            let b = CanonicalForm::from(json!({"v": b}));
            prop_assert_eq!(a.diff(&b).is_empty(), a == b);
        }
    }
}
