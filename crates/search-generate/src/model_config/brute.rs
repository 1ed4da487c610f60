use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{json, Value};

use search_space::{ParameterValues, SearchParameter};

use super::ModelConfigGenerator;
use crate::candidate::ModelVariantCandidate;

fn realize_values(param: &SearchParameter) -> Vec<i64> {
    match &param.values {
        ParameterValues::Range { min, max } => (*min..=*max).map(|idx| param.realized_value_at(idx)).collect(),
        ParameterValues::IntList(list) => list.clone(),
        ParameterValues::StrList(_) => Vec::new(),
    }
}

/// Cartesian product of every dimension's realized values, last dimension
/// varying fastest (row-major).
fn cartesian(dims: &IndexMap<String, Vec<i64>>) -> Vec<IndexMap<String, i64>> {
    let mut combos: Vec<IndexMap<String, i64>> = vec![IndexMap::new()];
    for (name, values) in dims {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.insert(name.clone(), *value);
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

fn build_param_combo(model_name_is_cpu_only: bool, combo: &IndexMap<String, i64>, max_batch_size: Option<i64>) -> Value {
    let mut doc = serde_json::Map::new();
    if let Some(count) = combo.get("instance_group") {
        let kind = if model_name_is_cpu_only { "KIND_CPU" } else { "KIND_GPU" };
        doc.insert(
            "instance_group".to_string(),
            json!([{"count": count, "kind": kind}]),
        );
    }
    if let Some(delay) = combo.get("max_queue_delay_microseconds") {
        doc.insert(
            "dynamic_batching".to_string(),
            json!({"max_queue_delay_microseconds": delay}),
        );
    }
    if let Some(mbs) = max_batch_size {
        doc.insert("max_batch_size".to_string(), json!(mbs));
    }
    Value::Object(doc)
}

/// Pre-expands every model-config dimension's cartesian product, and for
/// each combination, a max-batch-size sweep. Walks the max-batch-size axis
/// first, advancing to the next combination on plateau, bound violation,
/// or error.
pub struct BruteModelConfigGenerator {
    base_model_name: String,
    cpu_only: bool,
    combos: Vec<IndexMap<String, i64>>,
    max_batch_sizes: Vec<i64>,
    combo_idx: usize,
    batch_idx: usize,
    last_batch_throughput: Option<f64>,
    done: bool,
}

impl BruteModelConfigGenerator {
    pub fn new(
        base_model_name: impl Into<String>,
        cpu_only: bool,
        other_dims: IndexMap<String, SearchParameter>,
        max_batch_size: Option<&SearchParameter>,
    ) -> Self {
        let mut dims = IndexMap::new();
        for (name, param) in other_dims {
            dims.insert(name, realize_values(&param));
        }
        let combos = cartesian(&dims);
        let max_batch_sizes = max_batch_size.map(realize_values).unwrap_or_else(|| vec![]);

        BruteModelConfigGenerator {
            base_model_name: base_model_name.into(),
            cpu_only,
            combos,
            max_batch_sizes,
            combo_idx: 0,
            batch_idx: 0,
            last_batch_throughput: None,
            done: false,
        }
    }

    fn current_combo(&self) -> &IndexMap<String, i64> {
        &self.combos[self.combo_idx]
    }

    fn current_max_batch_size(&self) -> Option<i64> {
        self.max_batch_sizes.get(self.batch_idx).copied()
    }
}

impl ModelConfigGenerator for BruteModelConfigGenerator {
    fn done_walking(&self) -> bool {
        self.done || self.combos.is_empty() || self.combo_idx >= self.combos.len()
    }

    fn step(&mut self, throughput: Option<f64>, errored: bool) {
        if self.done_walking() {
            return;
        }

        let exceeded_bound = self.batch_idx + 1 >= self.max_batch_sizes.len();
        let plateaued = match (throughput, self.last_batch_throughput) {
            (Some(curr), Some(prev)) => curr <= prev,
            _ => false,
        };

        if errored || exceeded_bound || plateaued {
            self.combo_idx += 1;
            self.reset_max_batch_size();
            if self.combo_idx >= self.combos.len() {
                self.done = true;
            }
        } else {
            self.batch_idx += 1;
            self.last_batch_throughput = throughput;
        }
    }

    fn get_next_model_config_variant(&self) -> ModelVariantCandidate {
        let combo = build_param_combo(self.cpu_only, self.current_combo(), self.current_max_batch_size());
        ModelVariantCandidate::new(self.base_model_name.clone(), combo, HashMap::new())
    }

    fn reset_max_batch_size(&mut self) {
        self.batch_idx = 0;
        self.last_batch_throughput = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_space::ParameterUsage;

    fn int_list_param(name: &str, values: Vec<i64>) -> SearchParameter {
        SearchParameter::new(name, ParameterUsage::Model, ParameterValues::IntList(values))
    }

    #[test]
    fn walks_max_batch_size_before_advancing_combo() {
        let mut dims = IndexMap::new();
        dims.insert("instance_group".to_string(), int_list_param("instance_group", vec![1, 2]));
        let max_batch_size = int_list_param("max_batch_size", vec![1, 2, 4]);

        let mut gen = BruteModelConfigGenerator::new("resnet50", false, dims, Some(&max_batch_size));

        let first = gen.get_next_model_config_variant();
        assert_eq!(first.param_combo["max_batch_size"], json!(1));
        gen.step(Some(100.0), false);

        let second = gen.get_next_model_config_variant();
        assert_eq!(second.param_combo["max_batch_size"], json!(2));
    }

    #[test]
    fn plateau_advances_to_next_combo() {
        let mut dims = IndexMap::new();
        dims.insert("instance_group".to_string(), int_list_param("instance_group", vec![1, 2]));
        let max_batch_size = int_list_param("max_batch_size", vec![1, 2, 4]);
        let mut gen = BruteModelConfigGenerator::new("resnet50", false, dims, Some(&max_batch_size));

        gen.step(Some(100.0), false); // batch 1 -> 2
        gen.step(Some(100.0), false); // no increase: plateau, advance combo

        let variant = gen.get_next_model_config_variant();
        assert_eq!(variant.param_combo["instance_group"][0]["count"], json!(2));
        assert_eq!(variant.param_combo["max_batch_size"], json!(1));
    }

    #[test]
    fn exhausts_all_combos() {
        let mut dims = IndexMap::new();
        dims.insert("instance_group".to_string(), int_list_param("instance_group", vec![1, 2]));
        let mut gen = BruteModelConfigGenerator::new("resnet50", false, dims, None);

        assert!(!gen.done_walking());
        gen.step(None, true);
        assert!(!gen.done_walking());
        gen.step(None, true);
        assert!(gen.done_walking());
    }
}
