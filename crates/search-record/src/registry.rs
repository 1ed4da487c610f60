//! Tag → polarity registry.
//!
//! Stands in for the original implementation's per-metric-type class
//! hierarchy (`PerfThroughput`, `PerfLatency`, ...) and `RecordType`
//! lookup table: a tagged [`crate::Record`] plus this registry replaces the
//! class-per-metric design, per the re-architecture note on subtyping
//! without duck typing.

use crate::Polarity;

/// Well-known record tags and their fixed polarity.
pub const KNOWN_TAGS: &[(&str, Polarity)] = &[
    ("perf_throughput", Polarity::HigherBetter),
    ("perf_latency_p99", Polarity::LowerBetter),
    ("perf_latency_p90", Polarity::LowerBetter),
    ("perf_latency", Polarity::LowerBetter),
    ("perf_client_send_recv", Polarity::LowerBetter),
    ("gpu_utilization", Polarity::HigherBetter),
    ("gpu_used_memory", Polarity::LowerBetter),
    ("gpu_free_memory", Polarity::HigherBetter),
    ("gpu_power_usage", Polarity::LowerBetter),
    ("cpu_used_ram", Polarity::LowerBetter),
    ("cpu_available_ram", Polarity::HigherBetter),
];

/// Look up the polarity for a tag, defaulting to [`Polarity::HigherBetter`]
/// for unrecognized tags (matching the original base `Record` class, whose
/// comparisons are plain value comparisons unless a subclass overrides
/// them to be decreasing-is-better).
pub fn polarity_for(tag: &str) -> Polarity {
    KNOWN_TAGS
        .iter()
        .find(|(known, _)| *known == tag)
        .map(|(_, polarity)| *polarity)
        .unwrap_or(Polarity::HigherBetter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tag_resolves() {
        assert_eq!(polarity_for("perf_latency_p99"), Polarity::LowerBetter);
        assert_eq!(polarity_for("perf_throughput"), Polarity::HigherBetter);
    }

    #[test]
    fn unknown_tag_defaults_to_higher_better() {
        assert_eq!(polarity_for("some_custom_metric"), Polarity::HigherBetter);
    }
}
