/// Tunable constants shared by the sweeper and the run-config generators.
///
/// Defaults are taken verbatim from the upstream profiling constants. The
/// zero-tolerance used by the Result Store's comparators lives in
/// `search_core::EPSILON` instead of here, since it has to be shared with
/// `search-store`, a crate this one depends on (and so can't depend back on).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchTuning {
    /// Minimum fractional throughput gain to keep sweeping (`G_min`).
    pub gain_min: f64,
    /// Measurements required before gain-saturation is even checked (`T_min`).
    pub throughput_min_consecutive_tries: u32,
    /// Consecutive measurement misses before a profile aborts (`T_fail`).
    pub measurement_drought_threshold: u32,
    /// Neighborhood radius for Quick's coordinate descent.
    pub radius: i64,
    /// Minimum initialized neighbors before Quick starts stepping (`M_init`).
    pub min_initialized: usize,
    pub max_binary_search_steps: u32,
}

impl Default for SearchTuning {
    fn default() -> Self {
        SearchTuning {
            gain_min: 0.05,
            throughput_min_consecutive_tries: 4,
            measurement_drought_threshold: 2,
            radius: 3,
            min_initialized: 3,
            max_binary_search_steps: 5,
        }
    }
}
