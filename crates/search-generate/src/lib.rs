//! Inference-load sweeping and the per-model / run-config search
//! strategies that walk the space derived by `search-space`.

#![forbid(unsafe_code)]

mod candidate;
mod concurrency_sweep;
mod model_config;
mod run_config;
mod sweeper;
mod tuning;

pub use candidate::{ModelVariantCandidate, RunConfigCandidate};
pub use model_config::{AutomaticModelConfigGenerator, BruteModelConfigGenerator, ModelConfigGenerator};
pub use run_config::{
    BruteRunConfigGenerator, OptunaParameter, OptunaRunConfigGenerator, QuickDimension, QuickRunConfigGenerator,
    RunConfigGenerator,
};
pub use sweeper::InferenceLoadSweeper;
pub use tuning::SearchTuning;
