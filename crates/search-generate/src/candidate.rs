use std::collections::HashMap;

use serde_json::Value;

/// One model's proposed variant within a candidate run: the parameter
/// combination that defines the model-config variant, plus the
/// perf-analyzer parameters (batch size, concurrency or request-rate)
/// that scope this particular measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelVariantCandidate {
    pub base_model_name: String,
    pub param_combo: Value,
    pub perf_params: HashMap<String, i64>,
}

impl ModelVariantCandidate {
    pub fn new(base_model_name: impl Into<String>, param_combo: Value, perf_params: HashMap<String, i64>) -> Self {
        ModelVariantCandidate {
            base_model_name: base_model_name.into(),
            param_combo,
            perf_params,
        }
    }

    pub fn default_combo(base_model_name: impl Into<String>, perf_params: HashMap<String, i64>) -> Self {
        Self::new(base_model_name, Value::Object(serde_json::Map::new()), perf_params)
    }
}

/// A full candidate run: one variant per model, to be measured together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfigCandidate {
    pub models: Vec<ModelVariantCandidate>,
}

impl RunConfigCandidate {
    pub fn new(models: Vec<ModelVariantCandidate>) -> Self {
        RunConfigCandidate { models }
    }
}
