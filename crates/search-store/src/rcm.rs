use std::cmp::Ordering;
use std::collections::HashMap;

use search_constraints::ModelMetrics;
use search_record::Record;
use serde::{Deserialize, Serialize};

use crate::mcm::ModelConfigMeasurement;

const COMPARISON_SCORE_THRESHOLD: f64 = search_core::EPSILON;

fn average_across_devices(gpu_data: &HashMap<String, Vec<Record>>) -> Vec<Record> {
    let mut by_tag: HashMap<String, (f64, u32, search_record::Polarity)> = HashMap::new();
    for records in gpu_data.values() {
        for record in records {
            let entry = by_tag
                .entry(record.tag.clone())
                .or_insert((0.0, 0, record.polarity));
            entry.0 += record.value();
            entry.1 += 1;
        }
    }
    by_tag
        .into_iter()
        .map(|(tag, (sum, count, polarity))| {
            Record::with_polarity(tag, sum / count as f64, polarity)
        })
        .collect()
}

/// The set of metrics collected from all model configs in a single run:
/// GPU metrics (averaged across devices) plus each model's own non-GPU
/// [`ModelConfigMeasurement`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfigMeasurement {
    model_variants_name: String,
    gpu_data: HashMap<String, Vec<Record>>,
    avg_gpu_data: Vec<Record>,
    model_config_measurements: Vec<ModelConfigMeasurement>,
    model_config_weights: Vec<f64>,
}

impl RunConfigMeasurement {
    pub fn new(model_variants_name: impl Into<String>, gpu_data: HashMap<String, Vec<Record>>) -> Self {
        let avg_gpu_data = average_across_devices(&gpu_data);
        RunConfigMeasurement {
            model_variants_name: model_variants_name.into(),
            gpu_data,
            avg_gpu_data,
            model_config_measurements: Vec::new(),
            model_config_weights: Vec::new(),
        }
    }

    pub fn add_model_config_measurement(&mut self, measurement: ModelConfigMeasurement) {
        self.model_config_measurements.push(measurement);
        self.model_config_weights.push(1.0);
    }

    /// Overrides the default equal (unnormalized) per-model weighting with
    /// an explicit set, normalized here to sum to 1.
    pub fn set_model_config_weighting(&mut self, weights: &[f64]) {
        let total: f64 = weights.iter().sum();
        if total == 0.0 {
            return;
        }
        self.model_config_weights = weights.iter().map(|w| w / total).collect();
    }

    pub fn model_variants_name(&self) -> &str {
        &self.model_variants_name
    }

    pub fn model_config_measurements(&self) -> &[ModelConfigMeasurement] {
        &self.model_config_measurements
    }

    pub fn gpu_data(&self) -> &HashMap<String, Vec<Record>> {
        &self.gpu_data
    }

    /// Per-model view of every recorded metric (GPU average plus non-GPU),
    /// keyed by base model name, for constraint evaluation.
    pub fn data(&self) -> ModelMetrics {
        self.model_config_measurements
            .iter()
            .map(|mcm| {
                let mut metrics = self.avg_gpu_data.clone();
                metrics.extend(mcm.non_gpu_data.iter().cloned());
                (mcm.model_name().to_string(), metrics)
            })
            .collect()
    }

    pub fn get_gpu_metric(&self, tag: &str) -> Option<&Record> {
        self.avg_gpu_data.iter().find(|r| r.tag == tag)
    }

    fn weighted_mcm_scores(&self, other: &RunConfigMeasurement) -> Vec<f64> {
        self.model_config_measurements
            .iter()
            .zip(other.model_config_measurements.iter())
            .map(|(a, b)| a.calculate_weighted_score(b))
            .collect()
    }

    fn weighted_mcm_percentage_gains(&self, other: &RunConfigMeasurement) -> Vec<f64> {
        self.model_config_measurements
            .iter()
            .zip(other.model_config_measurements.iter())
            .map(|(a, b)| a.calculate_weighted_percentage_gain(b))
            .collect()
    }

    fn combine(&self, per_model_scores: &[f64]) -> f64 {
        per_model_scores
            .iter()
            .zip(self.model_config_weights.iter())
            .map(|(score, weight)| score * weight)
            .sum()
    }

    fn compare(&self, other: &RunConfigMeasurement) -> Ordering {
        let score = self.combine(&self.weighted_mcm_scores(other));
        if score > COMPARISON_SCORE_THRESHOLD {
            Ordering::Greater
        } else if score < -COMPARISON_SCORE_THRESHOLD {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }

    pub fn is_better_than(&self, other: &RunConfigMeasurement) -> bool {
        self.compare(other) == Ordering::Greater
    }

    pub fn calculate_weighted_percentage_gain(&self, other: &RunConfigMeasurement) -> f64 {
        self.combine(&self.weighted_mcm_percentage_gains(other))
    }
}

impl PartialEq for RunConfigMeasurement {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl PartialOrd for RunConfigMeasurement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}
