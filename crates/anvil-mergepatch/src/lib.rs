//! JSON merge patch (spec §4.5, §4.6, §9): the single routine reused by the
//! component-tree patch semantics, the `jsonMergePatch` engine helper, and
//! workflow script helpers.
//!
//! Patch application rule: for each key `k` in the patch object, `null`
//! deletes `k` from the target, an object value recursively merges, and any
//! other value replaces. A patch that is not itself an object replaces the
//! whole target.

use serde_json::{Map, Value};

/// Applies `patch` to `target`, returning the merged value. Neither input is
/// mutated.
pub fn merge_patch(target: &Value, patch: &Value) -> Value {
    let Value::Object(patch_map) = patch else {
        return patch.clone();
    };

    let mut result = match target {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    for (key, patch_value) in patch_map {
        if patch_value.is_null() {
            result.remove(key);
            continue;
        }
        let merged = match result.get(key) {
            Some(existing) => merge_patch(existing, patch_value),
            None => merge_patch(&Value::Null, patch_value),
        };
        result.insert(key.clone(), merged);
    }

    Value::Object(result)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn spec_example() {
        let target = json!({"a": "b", "c": {"d": "e", "f": "g"}});
        let patch = json!({"a": "z", "c": {"f": null}});
        let want = json!({"a": "z", "c": {"d": "e"}});
        assert_eq!(merge_patch(&target, &patch), want);
    }

    #[test]
    fn empty_patch_is_identity_on_objects() {
        let target = json!({"a": "b"});
        assert_eq!(merge_patch(&target, &json!({})), target);
    }

    #[test]
    fn null_patch_replaces_with_null() {
        let target = json!({"a": "b"});
        assert_eq!(merge_patch(&target, &Value::Null), Value::Null);
    }

    #[test]
    fn null_key_deletes() {
        let target = json!({"a": "b", "c": "d"});
        let merged = merge_patch(&target, &json!({"a": null}));
        assert!(merged.as_object().unwrap().get("a").is_none());
        assert_eq!(merged["c"], "d");
    }

    #[test]
    fn idempotent() {
        let target = json!({"a": "b", "c": {"d": "e", "f": "g"}});
        let patch = json!({"a": "z", "c": {"f": null}});
        let once = merge_patch(&target, &patch);
        let twice = merge_patch(&once, &patch);
        assert_eq!(once, twice);
    }

    #[test]
    fn non_object_value_replaces_whole_subtree() {
        let target = json!({"a": {"nested": true}});
        let patch = json!({"a": "scalar"});
        assert_eq!(merge_patch(&target, &patch)["a"], "scalar");
    }
}
