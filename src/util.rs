//! Small shared helpers.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a process-locally unique id with the given prefix.
///
/// Ids are `<prefix>_<utc-date>_<counter>`; the counter is process-local,
/// which is enough for message/conflict ids that only need to be unique
/// within an origin.
pub fn generate_id(prefix: &str) -> String {
    let now = Utc::now();
    let counter = ID_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}_{}_{:06}", prefix, now.format("%Y%m%d%H%M%S"), counter)
}

/// Deep-merge `patch` into `base` and return the result.
///
/// Objects merge key-wise recursively; any other value in `patch` replaces
/// the corresponding value in `base`. A `Null` base is replaced outright.
pub fn deep_merge(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            let mut merged = base_map.clone();
            for (key, patch_value) in patch_map {
                let next = match merged.get(key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => patch_value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generate_id_unique() {
        let a = generate_id("msg");
        let b = generate_id("msg");

        assert!(a.starts_with("msg_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_deep_merge_objects() {
        let base = json!({"a": {"x": 1, "y": 2}, "b": 1});
        let patch = json!({"a": {"y": 3, "z": 4}, "c": 5});

        let merged = deep_merge(&base, &patch);

        assert_eq!(merged, json!({"a": {"x": 1, "y": 3, "z": 4}, "b": 1, "c": 5}));
    }

    #[test]
    fn test_deep_merge_scalar_replaces() {
        let base = json!({"a": {"x": 1}});
        let patch = json!({"a": 7});

        assert_eq!(deep_merge(&base, &patch), json!({"a": 7}));
    }

    #[test]
    fn test_deep_merge_null_base() {
        let patch = json!({"a": 1});
        assert_eq!(deep_merge(&Value::Null, &patch), patch);
    }

    #[test]
    fn test_deep_merge_null_patch_value_overwrites() {
        let base = json!({"a": 1});
        let patch = json!({"a": null});

        assert_eq!(deep_merge(&base, &patch), json!({"a": null}));
    }
}
