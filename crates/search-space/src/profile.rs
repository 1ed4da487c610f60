use std::collections::HashMap;

use search_constraints::ModelConstraints;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exactly one of concurrency or request-rate load, as an optional
/// explicit list of values. `None` means "not pinned, derive a range
/// from the run-config-search bounds".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeLoadSpec {
    Concurrency(Option<Vec<u32>>),
    RequestRate(Option<Vec<u32>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceKind {
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceGroupSpec {
    pub kind: InstanceKind,
    pub count: Vec<u32>,
}

/// The per-model runtime parameters: `batch_sizes` plus exactly one of
/// `concurrency`/`request_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametersSpec {
    pub batch_sizes: Option<Vec<u32>>,
    pub runtime_load: RuntimeLoadSpec,
}

/// The optional `model_config_parameters` tree: explicit lists the user
/// has pinned for the model-config-layer search dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfigParametersSpec {
    pub instance_group: Option<Vec<InstanceGroupSpec>>,
    pub max_batch_size: Option<Vec<u32>>,
    pub max_queue_delay_microseconds: Option<Vec<u32>>,
}

/// Immutable per-model input to the search, built once at startup from
/// parsed configuration and frozen thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfileSpec {
    pub model_name: String,
    pub cpu_only: bool,
    /// Raw objective weights (e.g. `{"perf_throughput": 10}`), prior to
    /// normalization into a measurement's metric-weighting map.
    pub objectives: HashMap<String, f64>,
    pub constraints: Option<ModelConstraints>,
    /// Relative importance of this model versus others in a multi-model run.
    pub model_weighting: f64,
    /// The model's default config document, fetched once from the server.
    pub default_config: Value,
    pub perf_analyzer_flags: HashMap<String, String>,
    pub parameters: ParametersSpec,
    pub model_config_parameters: Option<ModelConfigParametersSpec>,
    pub supports_batching: bool,
    pub is_bls_model: bool,
    pub is_ensemble_model: bool,
    pub is_composing_model: bool,
}

impl ModelProfileSpec {
    pub fn new(model_name: impl Into<String>, parameters: ParametersSpec) -> Self {
        ModelProfileSpec {
            model_name: model_name.into(),
            cpu_only: false,
            objectives: HashMap::new(),
            constraints: None,
            model_weighting: 1.0,
            default_config: Value::Object(serde_json::Map::new()),
            perf_analyzer_flags: HashMap::new(),
            parameters,
            model_config_parameters: None,
            supports_batching: true,
            is_bls_model: false,
            is_ensemble_model: false,
            is_composing_model: false,
        }
    }
}
