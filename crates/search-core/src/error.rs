use thiserror::Error;

/// Errors surfaced by the search engine.
///
/// Variants map onto the taxonomy in the error-handling design: config
/// errors and variant-generation errors are non-recoverable and abort
/// before/during a single model's profile; fatal measurement drought aborts
/// a run already in progress. Harness misses and illegal combinations are
/// *not* represented here — those are handled locally by each generator's
/// state machine and never raised as errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("model '{model}' specifies both concurrency and request_rate; exactly one is allowed")]
    ConflictingInferenceLoad { model: String },

    #[error("model '{0}' uses request_rate while other profiled models use concurrency; all profiled models must agree")]
    MixedInferenceLoadMode(String),

    #[error("model '{model}': instance_group.count list {counts:?} is neither a contiguous linear sequence nor all powers of two, which Quick search requires")]
    UnsupportedInstanceCountList { model: String, counts: Vec<u32> },

    #[error("brute search mode is not supported for ensemble model '{0}'")]
    EnsembleNotSupported(String),

    #[error("model '{model}' had {misses} consecutive measurement misses with no successful measurement; aborting profile")]
    MeasurementDrought { model: String, misses: u32 },

    #[error("search space for model '{0}' is empty")]
    EmptySearchSpace(String),

    #[error("automatic model-config search for model '{0}' requires early-exit to be enabled")]
    AutomaticRequiresEarlyExit(String),

    #[error("checkpoint I/O error: {0}")]
    Checkpoint(#[from] std::io::Error),

    #[error("checkpoint (de)serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
