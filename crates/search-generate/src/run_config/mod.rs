mod brute;
mod optuna;
mod quick;

pub use brute::BruteRunConfigGenerator;
pub use optuna::{OptunaParameter, OptunaRunConfigGenerator};
pub use quick::{QuickDimension, QuickRunConfigGenerator};

use std::sync::atomic::AtomicBool;

use search_store::RunConfigMeasurement;

use crate::candidate::RunConfigCandidate;

/// Shared contract for the three run-config search strategies. Mirrors the
/// per-model generator's pull/push shape: the caller pulls the next
/// candidate, runs it through the harness, and pushes the resulting
/// measurements back before pulling again. `None` in the result vector
/// means the harness returned no measurement for that slot.
pub trait RunConfigGenerator {
    /// The next run config to measure, or `None` once exhausted or the
    /// shutdown flag is set.
    fn next_config(&mut self, shutdown: &AtomicBool) -> Option<RunConfigCandidate>;

    /// Feeds back the measurement for the most recently yielded config and
    /// whether it passed the constraint evaluator (meaningless when
    /// `measurement` is `None`, the caller should pass `false`).
    fn set_last_result(&mut self, measurement: Option<RunConfigMeasurement>, passes: bool);
}
