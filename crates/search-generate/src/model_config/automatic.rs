use std::collections::HashMap;

use serde_json::json;

use search_core::Error;

use super::ModelConfigGenerator;
use crate::candidate::ModelVariantCandidate;

/// Nested-loop model-config walk that never materializes the cross product:
/// outer loop is instance count, inner loop is max batch size doubling from
/// `min_model_batch_size` until plateau, bound, or error. Requires early
/// exit, since without it the inner loop has no stopping rule short of the
/// batch-size bound.
pub struct AutomaticModelConfigGenerator {
    base_model_name: String,
    cpu_only: bool,
    min_instance_count: i64,
    max_instance_count: i64,
    min_batch_size: i64,
    max_batch_size: i64,
    instance_count: i64,
    batch_size: i64,
    last_throughput: Option<f64>,
    done: bool,
}

impl AutomaticModelConfigGenerator {
    pub fn new(
        base_model_name: impl Into<String>,
        cpu_only: bool,
        instance_count_bounds: (i64, i64),
        batch_size_bounds: (i64, i64),
        early_exit_enabled: bool,
    ) -> Result<Self, Error> {
        let base_model_name = base_model_name.into();
        if !early_exit_enabled {
            return Err(Error::AutomaticRequiresEarlyExit(base_model_name));
        }
        let (min_instance_count, max_instance_count) = instance_count_bounds;
        let (min_batch_size, max_batch_size) = batch_size_bounds;

        Ok(AutomaticModelConfigGenerator {
            base_model_name,
            cpu_only,
            min_instance_count,
            max_instance_count,
            min_batch_size,
            max_batch_size,
            instance_count: min_instance_count,
            batch_size: min_batch_size,
            last_throughput: None,
            done: false,
        })
    }
}

impl ModelConfigGenerator for AutomaticModelConfigGenerator {
    fn done_walking(&self) -> bool {
        self.done || self.instance_count > self.max_instance_count
    }

    fn step(&mut self, throughput: Option<f64>, errored: bool) {
        if self.done_walking() {
            return;
        }

        let exceeded_bound = self.batch_size * 2 > self.max_batch_size;
        let plateaued = match (throughput, self.last_throughput) {
            (Some(curr), Some(prev)) => curr <= prev,
            _ => false,
        };

        if errored || exceeded_bound || plateaued {
            self.instance_count += 1;
            self.reset_max_batch_size();
            if self.instance_count > self.max_instance_count {
                self.done = true;
            }
        } else {
            self.batch_size *= 2;
            self.last_throughput = throughput;
        }
    }

    fn get_next_model_config_variant(&self) -> ModelVariantCandidate {
        let kind = if self.cpu_only { "KIND_CPU" } else { "KIND_GPU" };
        let combo = json!({
            "instance_group": [{"count": self.instance_count, "kind": kind}],
            "max_batch_size": self.batch_size,
        });
        ModelVariantCandidate::new(self.base_model_name.clone(), combo, HashMap::new())
    }

    fn reset_max_batch_size(&mut self) {
        self.batch_size = self.min_batch_size;
        self.last_throughput = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fails_fast_without_early_exit() {
        let result = AutomaticModelConfigGenerator::new("resnet50", false, (1, 2), (1, 8), false);
        assert!(matches!(result, Err(Error::AutomaticRequiresEarlyExit(_))));
    }

    #[test]
    fn doubles_batch_size_until_plateau_then_advances_instance_count() {
        let mut gen = AutomaticModelConfigGenerator::new("resnet50", false, (1, 2), (1, 8), true).unwrap();

        let first = gen.get_next_model_config_variant();
        assert_eq!(first.param_combo["max_batch_size"], json!(1));
        assert_eq!(first.param_combo["instance_group"][0]["count"], json!(1));

        gen.step(Some(10.0), false);
        let second = gen.get_next_model_config_variant();
        assert_eq!(second.param_combo["max_batch_size"], json!(2));

        gen.step(Some(10.0), false); // plateau: advances instance count
        let third = gen.get_next_model_config_variant();
        assert_eq!(third.param_combo["instance_group"][0]["count"], json!(2));
        assert_eq!(third.param_combo["max_batch_size"], json!(1));
    }

    #[test]
    fn exhausts_instance_count_range() {
        let mut gen = AutomaticModelConfigGenerator::new("resnet50", false, (1, 2), (1, 8), true).unwrap();
        assert!(!gen.done_walking());
        gen.step(None, true);
        assert!(!gen.done_walking());
        gen.step(None, true);
        assert!(gen.done_walking());
    }

    #[test]
    fn cpu_only_model_gets_cpu_kind() {
        let gen = AutomaticModelConfigGenerator::new("textnet", true, (1, 1), (1, 2), true).unwrap();
        let variant = gen.get_next_model_config_variant();
        assert_eq!(variant.param_combo["instance_group"][0]["kind"], json!("KIND_CPU"));
    }
}
