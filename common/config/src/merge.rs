use serde_json::Value;

/// Merges `overlay` on top of `base`: objects merge key-by-key recursively,
/// any other value (including an explicit `0`, `false`, or `null`) replaces
/// the base value outright. This is how later config files win over earlier
/// ones in §4.I's multi-file loader.
pub fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => merge_values(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_scalar_overrides_earlier() {
        let base = json!({ "gossip-port": 4000, "node-address": "aa" });
        let overlay = json!({ "gossip-port": 4100 });
        let merged = merge_values(base, overlay);
        assert_eq!(merged["gossip-port"], json!(4100));
        assert_eq!(merged["node-address"], json!("aa"));
    }

    #[test]
    fn explicit_zero_overrides_default() {
        let base = json!({ "consensus": { "retry-interval": 5 } });
        let overlay = json!({ "consensus": { "retry-interval": 0 } });
        let merged = merge_values(base, overlay);
        assert_eq!(merged["consensus"]["retry-interval"], json!(0));
    }

    #[test]
    fn nested_objects_merge_rather_than_replace() {
        let base = json!({ "mempool": { "pending-pool-size-in-bytes": 100, "max-number-of-transactions": 50 } });
        let overlay = json!({ "mempool": { "max-number-of-transactions": 200 } });
        let merged = merge_values(base, overlay);
        assert_eq!(merged["mempool"]["pending-pool-size-in-bytes"], json!(100));
        assert_eq!(merged["mempool"]["max-number-of-transactions"], json!(200));
    }
}
