// Copyright 2025 Cowboy AI, LLC.

//! Deep merge for metadata documents
//!
//! Objects merge key by key, arrays at the same path are concatenated and
//! any other pairing lets the later value win. Concatenation means merging
//! the same array-valued fragment twice duplicates its items.

use crate::pipeline::{stage, SyncStage};
use crate::identity::Identity;
use serde_json::{Map, Value};

/// Deep-merge `source` into `target`, treating `None` as an empty document
pub fn merge_value(target: Option<Value>, source: Option<Value>) -> Value {
    let mut merged = target.unwrap_or_else(|| Value::Object(Map::new()));
    if let Some(source) = source {
        merge_into(&mut merged, source);
    }
    merged
}

/// Deep-merge `source` into `target` in place
pub fn merge_into(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(source)) => target.extend(source),
        (target, source) => *target = source,
    }
}

/// A stage that deep-merges a fixed fragment into every document it sees
pub fn merge_stage(
    fragment: Value,
) -> SyncStage<impl Fn(Value, &Identity, &str) -> anyhow::Result<Value> + Send + Sync> {
    stage(move |document: Value, _: &Identity, _: &str| {
        Ok(merge_value(Some(document), Some(fragment.clone())))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_nested_objects_merge_key_by_key() {
        let target = json!({"paths": {"/orders": {"get": {"summary": "list"}}}});
        let source = json!({"paths": {"/orders": {"post": {"summary": "create"}}}});

        assert_eq!(
            merge_value(Some(target), Some(source)),
            json!({"paths": {"/orders": {
                "get": {"summary": "list"},
                "post": {"summary": "create"}
            }}})
        );
    }

    #[test]
    fn test_arrays_concatenate() {
        assert_eq!(
            merge_value(Some(json!({"items": [1]})), Some(json!({"items": [1]}))),
            json!({"items": [1, 1]})
        );
    }

    #[test]
    fn test_later_scalar_wins() {
        assert_eq!(
            merge_value(Some(json!({"a": 1, "b": "x"})), Some(json!({"a": 2}))),
            json!({"a": 2, "b": "x"})
        );
        assert_eq!(
            merge_value(Some(json!({"a": {"nested": true}})), Some(json!({"a": [1]}))),
            json!({"a": [1]})
        );
    }

    #[test]
    fn test_absent_inputs_are_empty_documents() {
        assert_eq!(merge_value(None, None), json!({}));
        assert_eq!(merge_value(None, Some(json!({"a": 1}))), json!({"a": 1}));
        assert_eq!(merge_value(Some(json!({"a": 1})), None), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_merge_stage() {
        use crate::pipeline::Stage;

        let stage = merge_stage(json!({"tags": ["audited"]}));
        let identity = Identity::from("Order");
        let document = stage
            .apply(json!({"tags": ["core"]}), &identity, "Order")
            .await
            .unwrap();
        assert_eq!(document, json!({"tags": ["core", "audited"]}));
    }
}
