//! Deterministic variant naming for model configuration candidates.
//!
//! A [`VariantNameManager`] maps `(base_model_name, param_combo)` to a
//! stable variant name. The same combination of parameters always yields
//! the same name; the empty combination is the distinguished "default"
//! variant. State is plain data (`Serialize`/`Deserialize`) so it can be
//! folded into a larger checkpoint document by a caller.

#![forbid(unsafe_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Deep, order-insensitive hash of a parameter combination.
///
/// Object keys are sorted before hashing so that two maps built in a
/// different insertion order collapse to the same key; array order is
/// preserved since it is semantically meaningful (e.g. `batch_sizes`).
pub fn hashable_key(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_value(value, &mut hasher);
    hasher.finish()
}

fn hash_value(value: &Value, hasher: &mut impl Hasher) {
    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Number(n) => {
            2u8.hash(hasher);
            n.to_string().hash(hasher);
        }
        Value::String(s) => {
            3u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Array(items) => {
            4u8.hash(hasher);
            items.len().hash(hasher);
            for item in items {
                hash_value(item, hasher);
            }
        }
        Value::Object(map) => {
            5u8.hash(hasher);
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.len().hash(hasher);
            for key in keys {
                key.hash(hasher);
                hash_value(&map[key], hasher);
            }
        }
    }
}

fn is_default_combo(param_combo: &Value) -> bool {
    matches!(param_combo, Value::Object(map) if map.is_empty())
}

/// Per-base-model variant naming state: `{base -> {hash(combo) -> name}}`
/// plus a monotonic per-base counter for the next non-default index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantNameManager {
    variant_names: HashMap<String, HashMap<u64, String>>,
    next_index: HashMap<String, u32>,
}

impl VariantNameManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the variant name for this `(base_model_name, param_combo)`
    /// pair, minting and caching a new one if this is the first time the
    /// combination has been seen. Stable across repeated calls and across
    /// process restarts that restore the same state.
    pub fn get_variant_name(&mut self, base_model_name: &str, param_combo: &Value) -> String {
        let key = hashable_key(param_combo);

        if let Some(existing) = self
            .variant_names
            .get(base_model_name)
            .and_then(|combos| combos.get(&key))
        {
            return existing.clone();
        }

        let variant_name = if is_default_combo(param_combo) {
            format!("{base_model_name}_config_default")
        } else {
            let next = self.next_index.entry(base_model_name.to_string()).or_insert(0);
            let name = format!("{base_model_name}_config_{next}");
            *next += 1;
            name
        };

        self.variant_names
            .entry(base_model_name.to_string())
            .or_default()
            .insert(key, variant_name.clone());

        variant_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_combo_gets_distinguished_name() {
        let mut mgr = VariantNameManager::new();
        let name = mgr.get_variant_name("resnet50", &json!({}));
        assert_eq!(name, "resnet50_config_default");
    }

    #[test]
    fn repeated_calls_with_equal_combo_are_idempotent() {
        let mut mgr = VariantNameManager::new();
        let combo = json!({"instance_group": [{"count": 1, "kind": "KIND_GPU"}]});
        let a = mgr.get_variant_name("resnet50", &combo);
        let b = mgr.get_variant_name("resnet50", &combo);
        assert_eq!(a, b);
        assert_eq!(a, "resnet50_config_0");
    }

    #[test]
    fn distinct_combos_get_distinct_names_with_increasing_index() {
        let mut mgr = VariantNameManager::new();
        let a = mgr.get_variant_name(
            "resnet50",
            &json!({"instance_group": [{"count": 1, "kind": "KIND_GPU"}]}),
        );
        let b = mgr.get_variant_name(
            "resnet50",
            &json!({"instance_group": [{"count": 2, "kind": "KIND_GPU"}]}),
        );
        assert_eq!(a, "resnet50_config_0");
        assert_eq!(b, "resnet50_config_1");
    }

    #[test]
    fn key_order_does_not_affect_naming() {
        let mut mgr = VariantNameManager::new();
        let a = mgr.get_variant_name("resnet50", &json!({"a": 1, "b": 2}));
        let b = mgr.get_variant_name("resnet50", &json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn array_order_does_affect_naming() {
        let mut mgr = VariantNameManager::new();
        let a = mgr.get_variant_name("resnet50", &json!({"batch_sizes": [1, 2]}));
        let b = mgr.get_variant_name("resnet50", &json!({"batch_sizes": [2, 1]}));
        assert_ne!(a, b);
    }

    #[test]
    fn distinct_base_models_are_independent() {
        let mut mgr = VariantNameManager::new();
        let combo = json!({"instance_group": [{"count": 1, "kind": "KIND_GPU"}]});
        let a = mgr.get_variant_name("resnet50", &combo);
        let b = mgr.get_variant_name("vgg16", &combo);
        assert_eq!(a, "resnet50_config_0");
        assert_eq!(b, "vgg16_config_0");
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut mgr = VariantNameManager::new();
        mgr.get_variant_name("resnet50", &json!({}));
        mgr.get_variant_name(
            "resnet50",
            &json!({"instance_group": [{"count": 1, "kind": "KIND_GPU"}]}),
        );

        let serialized = serde_json::to_string(&mgr).unwrap();
        let mut restored: VariantNameManager = serde_json::from_str(&serialized).unwrap();

        let name = restored.get_variant_name(
            "resnet50",
            &json!({"instance_group": [{"count": 1, "kind": "KIND_GPU"}]}),
        );
        assert_eq!(name, "resnet50_config_0");

        let next = restored.get_variant_name(
            "resnet50",
            &json!({"instance_group": [{"count": 2, "kind": "KIND_GPU"}]}),
        );
        assert_eq!(next, "resnet50_config_1");
    }
}
