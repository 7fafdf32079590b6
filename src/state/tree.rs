//! Deep merge over JSON trees.

use serde_json::{Map, Value};

use super::versioned::CommittedEntry;

/// Merges `overlay` into `base`.
///
/// Objects are merged key by key, recursively. Any other pairing (including
/// arrays) is resolved by replacing the base value with the overlay value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Returns `base` with `overlay` merged on top, leaving both untouched.
pub fn merged(base: &Value, overlay: &Value) -> Value {
    let mut out = base.clone();
    deep_merge(&mut out, overlay.clone());
    out
}

/// Folds committed deltas, oldest first, into one combined delta.
///
/// Folding nothing yields an empty object.
pub fn fold<'a>(entries: impl IntoIterator<Item = &'a CommittedEntry>) -> Value {
    let mut acc = Value::Object(Map::new());
    for entry in entries {
        deep_merge(&mut acc, entry.data.clone());
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(seq_num: u64, data: Value) -> CommittedEntry {
        CommittedEntry { seq_num, data }
    }

    #[test]
    fn test_deep_merge_recurses_into_objects() {
        let mut base = json!({"search_results": {"a": [1]}, "item_details": {}});
        deep_merge(&mut base, json!({"search_results": {"b": [2]}}));

        assert_eq!(
            base,
            json!({"search_results": {"a": [1], "b": [2]}, "item_details": {}})
        );
    }

    #[test]
    fn test_deep_merge_replaces_arrays() {
        let mut base = json!({"q": [1, 2, 3]});
        deep_merge(&mut base, json!({"q": [4]}));
        assert_eq!(base, json!({"q": [4]}));
    }

    #[test]
    fn test_deep_merge_mixed_kinds_replace() {
        let mut base = json!({"a": {"nested": true}, "b": 1});
        deep_merge(&mut base, json!({"a": "flat", "b": {"now": "object"}}));
        assert_eq!(base, json!({"a": "flat", "b": {"now": "object"}}));
    }

    #[test]
    fn test_merged_leaves_inputs_alone() {
        let base = json!({"a": {"x": 1}});
        let overlay = json!({"a": {"y": 2}});

        assert_eq!(merged(&base, &overlay), json!({"a": {"x": 1, "y": 2}}));
        assert_eq!(base, json!({"a": {"x": 1}}));
    }

    #[test]
    fn test_fold_last_writer_wins_per_leaf() {
        let entries = vec![
            entry(1, json!({"s": {"k": "first", "keep": 1}})),
            entry(2, json!({"s": {"k": "second"}})),
        ];
        assert_eq!(fold(&entries), json!({"s": {"k": "second", "keep": 1}}));
    }

    #[test]
    fn test_fold_disjoint_keys_is_order_independent() {
        let one = entry(1, json!({"s": {"a": 1}}));
        let two = entry(2, json!({"s": {"b": 2}}));

        assert_eq!(fold([&one, &two]), fold([&two, &one]));
    }

    #[test]
    fn test_fold_empty() {
        let entries: Vec<CommittedEntry> = Vec::new();
        assert_eq!(fold(&entries), json!({}));
    }
}
