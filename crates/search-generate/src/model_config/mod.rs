mod automatic;
mod brute;

pub use automatic::AutomaticModelConfigGenerator;
pub use brute::BruteModelConfigGenerator;

use crate::candidate::ModelVariantCandidate;

/// Shared contract for the two per-model model-config search strategies
/// (Brute's cartesian walk and Automatic's nested-loop walk).
pub trait ModelConfigGenerator {
    /// True once every candidate this generator will produce has been
    /// yielded.
    fn done_walking(&self) -> bool;

    /// Advances internal state using the result of the most recently
    /// yielded candidate. `throughput` is `None` when the harness returned
    /// no measurement; `errored` additionally distinguishes an illegal
    /// config from a legitimate "plateaued" stop.
    fn step(&mut self, throughput: Option<f64>, errored: bool);

    /// The model-config variant for the current state. Must not be called
    /// once [`ModelConfigGenerator::done_walking`] is true.
    fn get_next_model_config_variant(&self) -> ModelVariantCandidate;

    /// Resets the max-batch-size axis back to its starting point, used
    /// when a caller wants to re-walk batch sizes for a new outer
    /// configuration without rebuilding the whole generator.
    fn reset_max_batch_size(&mut self);
}
