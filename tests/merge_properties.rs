//! Algebraic properties of deep merge

use cim_metadata::merge_value;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

fn document(prefix: &str, fields: BTreeMap<String, i32>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (format!("{prefix}{key}"), json!(value)))
            .collect::<Map<String, Value>>(),
    )
}

fn fields() -> impl Strategy<Value = BTreeMap<String, i32>> {
    proptest::collection::btree_map("[a-z]{1,8}", any::<i32>(), 0..8)
}

fn merge(a: Value, b: Value) -> Value {
    merge_value(Some(a), Some(b))
}

proptest! {
    #[test]
    fn merge_is_associative_on_disjoint_keys(a in fields(), b in fields(), c in fields()) {
        let (a, b, c) = (document("a_", a), document("b_", b), document("c_", c));
        let left = merge(merge(a.clone(), b.clone()), c.clone());
        let right = merge(a, merge(b, c));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn merge_commutes_on_disjoint_keys(a in fields(), b in fields()) {
        let (a, b) = (document("a_", a), document("b_", b));
        prop_assert_eq!(merge(a.clone(), b.clone()), merge(b, a));
    }

    #[test]
    fn empty_document_is_identity(a in fields()) {
        let a = document("", a);
        prop_assert_eq!(merge(a.clone(), json!({})), a.clone());
        prop_assert_eq!(merge(json!({}), a.clone()), a.clone());
        prop_assert_eq!(merge_value(None, Some(a.clone())), a.clone());
        prop_assert_eq!(merge_value(Some(a.clone()), None), a);
    }

    #[test]
    fn array_merge_concatenates(a in proptest::collection::vec(any::<i32>(), 0..16),
                                b in proptest::collection::vec(any::<i32>(), 0..16)) {
        let merged = merge(json!({"items": a.clone()}), json!({"items": b.clone()}));
        let mut expected = a;
        expected.extend(b);
        prop_assert_eq!(merged, json!({"items": expected}));
    }
}

#[test]
fn array_merge_is_not_idempotent() {
    let fragment = json!({"tags": ["x"]});
    let once = merge(json!({}), fragment.clone());
    let twice = merge(once.clone(), fragment);

    assert_eq!(once, json!({"tags": ["x"]}));
    assert_eq!(twice, json!({"tags": ["x", "x"]}));
}

#[test]
fn later_scalar_wins() {
    assert_eq!(
        merge(json!({"a": {"b": 1}}), json!({"a": {"b": 2, "c": 3}})),
        json!({"a": {"b": 2, "c": 3}})
    );
    assert_eq!(merge(json!({"a": [1]}), json!({"a": "list"})), json!({"a": "list"}));
}
