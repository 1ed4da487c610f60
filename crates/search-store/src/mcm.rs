use std::cmp::Ordering;
use std::collections::HashMap;

use search_record::Record;
use serde::{Deserialize, Serialize};

/// Scores within this distance of zero are treated as a tie rather than a
/// win for either side.
const COMPARISON_SCORE_THRESHOLD: f64 = search_core::EPSILON;

/// One model variant's non-GPU metrics from a single run, plus the
/// model-specific perf-analyzer parameters (batch size, concurrency or
/// request-rate) that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfigMeasurement {
    pub model_config_name: String,
    pub model_specific_params: HashMap<String, i64>,
    pub non_gpu_data: Vec<Record>,
    metric_weights: HashMap<String, f64>,
}

impl ModelConfigMeasurement {
    pub fn new(
        model_config_name: impl Into<String>,
        model_specific_params: HashMap<String, i64>,
        non_gpu_data: Vec<Record>,
    ) -> Self {
        let mut metric_weights = HashMap::new();
        metric_weights.insert("perf_throughput".to_string(), 1.0);
        ModelConfigMeasurement {
            model_config_name: model_config_name.into(),
            model_specific_params,
            non_gpu_data,
            metric_weights,
        }
    }

    /// The base model name, derived from `<base>_config_<n>` /
    /// `<base>_config_default`.
    pub fn model_name(&self) -> &str {
        self.model_config_name
            .split("_config_")
            .next()
            .unwrap_or(&self.model_config_name)
    }

    /// Normalizes the given objective weights to sum to 1 and adopts them
    /// as this measurement's metric-weighting map.
    pub fn set_metric_weighting(&mut self, objectives: &HashMap<String, f64>) {
        let total: f64 = objectives.values().sum();
        if total == 0.0 {
            return;
        }
        self.metric_weights = objectives
            .iter()
            .map(|(tag, weight)| (tag.clone(), weight / total))
            .collect();
    }

    pub fn get_metric(&self, tag: &str) -> Option<&Record> {
        self.non_gpu_data.iter().find(|r| r.tag == tag)
    }

    pub fn get_metric_value(&self, tag: &str, default_value: f64) -> f64 {
        self.get_metric(tag).map(Record::value).unwrap_or(default_value)
    }

    /// Weighted score of `self` against `other`: positive means `self` is
    /// better. Each objective's per-metric gain is normalized by the pair's
    /// average value before weighting, so objectives of different scales
    /// contribute comparably.
    pub(crate) fn calculate_weighted_score(&self, other: &ModelConfigMeasurement) -> f64 {
        let mut score = 0.0;
        for (objective, weight) in &self.metric_weights {
            let self_metric = self.get_metric(objective);
            let other_metric = other.get_metric(objective);
            match (self_metric, other_metric) {
                (Some(_), None) => return 1.0,
                (None, Some(_)) => return -1.0,
                (None, None) => continue,
                (Some(a), Some(b)) => {
                    let diff = a.gain_over(b).value();
                    let average = (a.value() + b.value()) / 2.0;
                    if average != 0.0 {
                        score += weight * (diff / average);
                    }
                }
            }
        }
        score
    }

    /// Weighted percentage gain of `self` over `other`, e.g. `25.0` meaning
    /// self is 25% better overall across weighted objectives.
    pub fn calculate_weighted_percentage_gain(&self, other: &ModelConfigMeasurement) -> f64 {
        let mut pct = 0.0;
        for (objective, weight) in &self.metric_weights {
            let self_metric = self.get_metric(objective);
            let other_metric = other.get_metric(objective);
            match (self_metric, other_metric) {
                (Some(_), None) => return 100.0,
                (None, Some(_)) => return -100.0,
                (None, None) => continue,
                (Some(a), Some(b)) => {
                    pct += a.percentage_gain_over(b) * weight;
                }
            }
        }
        pct
    }

    fn compare(&self, other: &ModelConfigMeasurement) -> Ordering {
        let score = self.calculate_weighted_score(other);
        if score > COMPARISON_SCORE_THRESHOLD {
            Ordering::Greater
        } else if score < -COMPARISON_SCORE_THRESHOLD {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }

    pub fn is_better_than(&self, other: &ModelConfigMeasurement) -> bool {
        self.compare(other) == Ordering::Greater
    }
}

impl PartialEq for ModelConfigMeasurement {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcm(name: &str, throughput: f64) -> ModelConfigMeasurement {
        ModelConfigMeasurement::new(name, HashMap::new(), vec![Record::new("perf_throughput", throughput)])
    }

    #[test]
    fn model_name_strips_config_suffix() {
        let m = mcm("resnet50_config_3", 100.0);
        assert_eq!(m.model_name(), "resnet50");
    }

    #[test]
    fn higher_throughput_is_better() {
        let fast = mcm("resnet50_config_0", 200.0);
        let slow = mcm("resnet50_config_1", 100.0);
        assert!(fast.is_better_than(&slow));
        assert!(!slow.is_better_than(&fast));
    }

    #[test]
    fn equal_measurements_compare_equal() {
        let a = mcm("resnet50_config_0", 100.0);
        let b = mcm("resnet50_config_1", 100.0);
        assert_eq!(a, b);
    }

    #[test]
    fn weighted_percentage_gain_is_positive_when_better() {
        let fast = mcm("resnet50_config_0", 150.0);
        let slow = mcm("resnet50_config_1", 100.0);
        assert!((fast.calculate_weighted_percentage_gain(&slow) - 50.0).abs() < 1e-9);
    }
}
