//! Deep merge and deep diff over generic JSON trees.
//!
//! Implements key-by-key merging where overlay values override base values.
//! Arrays are concatenated and deduplicated, not replaced.

use serde_json::{Map, Value};

/// Deep merge two JSON objects, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays are concatenated, keeping base order first, then overlay elements
///   not already present (deduplicated by value equality)
/// - Anything else is replaced by the overlay value, including an overlay
///   null overwriting a base object
///
/// Neither input is mutated; the result is a fresh tree.
///
/// # Example
/// ```
/// use serde_json::json;
/// use legion_settings::merge::deep_merge;
///
/// let base = json!({
///     "transport": { "port": 5672, "host": "localhost" },
///     "tags": ["a", "b"]
/// });
/// let overlay = json!({
///     "transport": { "port": 5673 },
///     "tags": ["b", "c"]
/// });
/// let merged = deep_merge(base.as_object().unwrap(), overlay.as_object().unwrap());
/// // { "transport": { "port": 5673, "host": "localhost" }, "tags": ["a", "b", "c"] }
/// ```
pub fn deep_merge(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, overlay_value) in overlay {
        let value = match (base.get(key), overlay_value) {
            (Some(Value::Object(base_map)), Value::Object(overlay_map)) => {
                Value::Object(deep_merge(base_map, overlay_map))
            }
            (Some(Value::Array(base_seq)), Value::Array(overlay_seq)) => {
                Value::Array(concat_dedup(base_seq, overlay_seq))
            }
            _ => overlay_value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    merged
}

/// Concatenate two sequences, dropping duplicates by value equality.
/// Base elements keep their order; overlay elements that are new are
/// appended in overlay order.
fn concat_dedup(base: &[Value], overlay: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(base.len() + overlay.len());
    for value in base.iter().chain(overlay.iter()) {
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}

/// Deep diff two JSON objects.
///
/// For the union of keys in both trees: equal values are skipped; when both
/// sides are objects the diff recurses and is included only if non-empty;
/// otherwise the entry maps to a two-element `[before, after]` array, with
/// null standing in for an absent side.
///
/// The diff is observability data only; it never gates a merge.
pub fn deep_diff(before: &Map<String, Value>, after: &Map<String, Value>) -> Map<String, Value> {
    let mut diff = Map::new();
    let keys = before.keys().chain(after.keys().filter(|k| !before.contains_key(*k)));
    for key in keys {
        let lhs = before.get(key);
        let rhs = after.get(key);
        if lhs == rhs {
            continue;
        }
        match (lhs, rhs) {
            (Some(Value::Object(lhs_map)), Some(Value::Object(rhs_map))) => {
                let nested = deep_diff(lhs_map, rhs_map);
                if !nested.is_empty() {
                    diff.insert(key.clone(), Value::Object(nested));
                }
            }
            _ => {
                let pair = vec![
                    lhs.cloned().unwrap_or(Value::Null),
                    rhs.cloned().unwrap_or(Value::Null),
                ];
                diff.insert(key.clone(), Value::Array(pair));
            }
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_merge_simple_objects() {
        let base = obj(json!({"a": 1, "b": 2}));
        let overlay = obj(json!({"b": 3, "c": 4}));
        let result = deep_merge(&base, &overlay);
        assert_eq!(Value::Object(result), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_merge_nested_objects() {
        let base = obj(json!({
            "transport": {"host": "localhost", "port": 5672},
            "reload": false
        }));
        let overlay = obj(json!({
            "transport": {"port": 5673}
        }));
        let result = deep_merge(&base, &overlay);
        assert_eq!(
            Value::Object(result),
            json!({
                "transport": {"host": "localhost", "port": 5673},
                "reload": false
            })
        );
    }

    #[test]
    fn test_arrays_concatenated_and_deduplicated() {
        let base = obj(json!({"items": [1, 2, 3]}));
        let overlay = obj(json!({"items": [3, 4, 2]}));
        let result = deep_merge(&base, &overlay);
        assert_eq!(Value::Object(result), json!({"items": [1, 2, 3, 4]}));
    }

    #[test]
    fn test_overlay_null_wins() {
        let base = obj(json!({"a": 1, "b": {"c": 2}}));
        let overlay = obj(json!({"a": null, "b": null}));
        let result = deep_merge(&base, &overlay);
        assert_eq!(Value::Object(result), json!({"a": null, "b": null}));
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let base = obj(json!({"a": 1, "b": {"c": [1, 2]}, "d": null}));
        assert_eq!(deep_merge(&base, &Map::new()), base);
        assert_eq!(deep_merge(&Map::new(), &base), base);
    }

    #[test]
    fn test_self_merge_idempotent_for_objects_and_scalars() {
        let base = obj(json!({"a": 1, "b": {"c": "x"}, "list": [1, 2, 2]}));
        let merged = deep_merge(&base, &base);
        // Scalars and objects are unchanged; the array collapses to its
        // distinct values and stays there on re-merge.
        assert_eq!(
            Value::Object(merged.clone()),
            json!({"a": 1, "b": {"c": "x"}, "list": [1, 2]})
        );
        assert_eq!(deep_merge(&merged, &merged), merged);
    }

    #[test]
    fn test_overlapping_sequences_converge() {
        let a = obj(json!({"list": [1, 2]}));
        let b = obj(json!({"list": [2, 3]}));
        let once = deep_merge(&a, &b);
        assert_eq!(Value::Object(once.clone()), json!({"list": [1, 2, 3]}));
        // Re-applying the same overlay adds nothing further.
        assert_eq!(deep_merge(&once, &b), once);
    }

    #[test]
    fn test_inputs_not_mutated() {
        let base = obj(json!({"a": {"b": 1}, "list": [1]}));
        let overlay = obj(json!({"a": {"c": 2}, "list": [2]}));
        let base_copy = base.clone();
        let overlay_copy = overlay.clone();
        let _ = deep_merge(&base, &overlay);
        assert_eq!(base, base_copy);
        assert_eq!(overlay, overlay_copy);
    }

    #[test]
    fn test_diff_of_identical_trees_is_empty() {
        let tree = obj(json!({
            "a": 1,
            "b": {"c": [1, 2], "d": null},
            "e": "text"
        }));
        assert!(deep_diff(&tree, &tree).is_empty());
        assert!(deep_diff(&Map::new(), &Map::new()).is_empty());
    }

    #[test]
    fn test_diff_reports_before_after_pairs() {
        let before = obj(json!({"a": 1, "b": {"c": 2, "d": 3}}));
        let after = obj(json!({"a": 2, "b": {"c": 2, "d": 4}, "e": 5}));
        let diff = deep_diff(&before, &after);
        assert_eq!(
            Value::Object(diff),
            json!({
                "a": [1, 2],
                "b": {"d": [3, 4]},
                "e": [null, 5]
            })
        );
    }

    #[test]
    fn test_diff_removed_key_pairs_with_null() {
        let before = obj(json!({"gone": "x"}));
        let after = Map::new();
        let diff = deep_diff(&before, &after);
        assert_eq!(Value::Object(diff), json!({"gone": ["x", null]}));
    }

    /// Overwrite `target` with the after-side values of a diff.
    fn apply_after(target: &mut Map<String, Value>, diff: &Map<String, Value>) {
        for (key, entry) in diff {
            match entry {
                Value::Object(nested) => {
                    if let Some(Value::Object(sub)) = target.get_mut(key) {
                        apply_after(sub, nested);
                    }
                }
                Value::Array(pair) => {
                    let after = pair[1].clone();
                    if after == Value::Null && !pair[0].is_null() {
                        target.remove(key);
                    } else {
                        target.insert(key.clone(), after);
                    }
                }
                _ => unreachable!("diff entries are objects or pairs"),
            }
        }
    }

    #[test]
    fn test_diff_round_trip_reconstructs_after() {
        let before = obj(json!({
            "a": 1,
            "b": {"c": 2, "d": [1, 2]},
            "gone": true
        }));
        let after = obj(json!({
            "a": 9,
            "b": {"c": 2, "d": [3]},
            "new": {"nested": "value"}
        }));
        let diff = deep_diff(&before, &after);
        let mut rebuilt = before.clone();
        apply_after(&mut rebuilt, &diff);
        assert_eq!(rebuilt, after);
    }
}
