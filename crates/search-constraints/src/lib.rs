//! Per-model and global metric constraints.
//!
//! A [`ConstraintEvaluator`] holds one [`ModelConstraints`] set per model
//! name plus an optional global set used as a default for models that
//! don't declare their own. It checks whether a set of per-model metric
//! records satisfies those bounds, and scores how far a failing set is
//! from satisfying them.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use search_record::Record;
use serde::{Deserialize, Serialize};

/// Key under which the global constraint set is conventionally stored
/// alongside per-model entries, mirroring the upstream config loader's
/// reserved model name for the profile-wide `constraints` block.
pub const GLOBAL_CONSTRAINTS_KEY: &str = "__default__";

/// A view of one run's measurements: model name to the metric records
/// collected for that model's slot in the run.
pub type ModelMetrics = HashMap<String, Vec<Record>>;

/// An optional min and/or max bound on a single metric tag.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConstraintBound {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ConstraintBound {
    pub fn min(value: f64) -> Self {
        ConstraintBound {
            min: Some(value),
            max: None,
        }
    }

    pub fn max(value: f64) -> Self {
        ConstraintBound {
            min: None,
            max: Some(value),
        }
    }

    /// Fraction by which `value` violates this bound, scaled so that a
    /// non-violation is exactly `0.0`. `(min - value) / min` for a min
    /// violation, `(value - max) / max` for a max violation.
    fn failure_fraction(&self, value: f64) -> f64 {
        let mut failure = 0.0;
        if let Some(min) = self.min {
            if value < min {
                failure += (min - value) / min;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                failure += (value - max) / max;
            }
        }
        failure
    }

    /// The tighter of two bounds: the higher of two mins, the lower of two
    /// maxes. A bound present in only one side passes through unchanged.
    fn tighter(&self, other: &ConstraintBound) -> ConstraintBound {
        let min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        ConstraintBound { min, max }
    }
}

/// `{tag -> bound}` constraints for one model.
pub type ModelConstraints = HashMap<String, ConstraintBound>;

/// Merge a per-model constraint set with the global default set, taking
/// the tighter bound for any tag present in both.
pub fn merge_with_global(model: &ModelConstraints, global: &ModelConstraints) -> ModelConstraints {
    let mut merged = global.clone();
    for (tag, bound) in model {
        merged
            .entry(tag.clone())
            .and_modify(|existing| *existing = existing.tighter(bound))
            .or_insert(*bound);
    }
    merged
}

/// Holds per-model constraints and an optional global fallback set, and
/// evaluates run measurements against them.
#[derive(Debug, Clone, Default)]
pub struct ConstraintEvaluator {
    per_model: HashMap<String, ModelConstraints>,
    global: Option<ModelConstraints>,
}

impl ConstraintEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_constraints(mut self, model_name: impl Into<String>, constraints: ModelConstraints) -> Self {
        self.per_model.insert(model_name.into(), constraints);
        self
    }

    pub fn with_global_constraints(mut self, constraints: ModelConstraints) -> Self {
        self.global = Some(constraints);
        self
    }

    /// Effective constraints for a model: its own set merged with the
    /// global default if both exist, the global set alone if only that
    /// exists, or `None` if the model is entirely unconstrained.
    fn constraints_for(&self, model_name: &str) -> Option<ModelConstraints> {
        match (self.per_model.get(model_name), &self.global) {
            (Some(model), Some(global)) => Some(merge_with_global(model, global)),
            (Some(model), None) => Some(model.clone()),
            (None, Some(global)) => Some(global.clone()),
            (None, None) => None,
        }
    }

    /// True iff every recorded metric, for every model slot, respects any
    /// bound declared for its tag. A model or metric with no matching
    /// constraint entry always passes.
    pub fn satisfies(&self, measurements: &ModelMetrics) -> bool {
        if self.per_model.is_empty() && self.global.is_none() {
            return true;
        }
        for (model_name, metrics) in measurements {
            let Some(constraints) = self.constraints_for(model_name) else {
                continue;
            };
            for metric in metrics {
                if let Some(bound) = constraints.get(&metric.tag) {
                    if bound.failure_fraction(metric.value()) > 0.0 {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Additive failure distance across every violated bound, scaled ×100
    /// (`0.0` for a fully passing measurement).
    pub fn failure_percentage(&self, measurements: &ModelMetrics) -> f64 {
        let mut total = 0.0;
        for (model_name, metrics) in measurements {
            let Some(constraints) = self.constraints_for(model_name) else {
                continue;
            };
            for metric in metrics {
                if let Some(bound) = constraints.get(&metric.tag) {
                    total += bound.failure_fraction(metric.value());
                }
            }
        }
        total * 100.0
    }

    /// `(a.failure - b.failure) / 100` when both fail; `None` when either
    /// passes, signaling the caller should fall back to the ordinary
    /// measurement comparator instead.
    pub fn compare_constraints(&self, a: &ModelMetrics, b: &ModelMetrics) -> Option<f64> {
        let a_fails = !self.satisfies(a);
        let b_fails = !self.satisfies(b);
        if a_fails && b_fails {
            Some((self.failure_percentage(a) - self.failure_percentage(b)) / 100.0)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(model: &str, tag: &str, value: f64) -> ModelMetrics {
        let mut m = ModelMetrics::new();
        m.insert(model.to_string(), vec![Record::new(tag, value)]);
        m
    }

    #[test]
    fn unconstrained_model_always_passes() {
        let eval = ConstraintEvaluator::new();
        assert!(eval.satisfies(&metrics("resnet50", "perf_latency_p99", 999.0)));
    }

    #[test]
    fn max_bound_violation_fails() {
        let mut constraints = ModelConstraints::new();
        constraints.insert("perf_latency_p99".into(), ConstraintBound::max(50.0));
        let eval = ConstraintEvaluator::new().with_model_constraints("resnet50", constraints);

        assert!(eval.satisfies(&metrics("resnet50", "perf_latency_p99", 40.0)));
        assert!(!eval.satisfies(&metrics("resnet50", "perf_latency_p99", 60.0)));
    }

    #[test]
    fn failure_percentage_is_scaled_distance() {
        let mut constraints = ModelConstraints::new();
        constraints.insert("perf_latency_p99".into(), ConstraintBound::max(50.0));
        let eval = ConstraintEvaluator::new().with_model_constraints("resnet50", constraints);

        let pct = eval.failure_percentage(&metrics("resnet50", "perf_latency_p99", 75.0));
        assert!((pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn model_without_constraints_falls_back_to_global() {
        let mut global = ModelConstraints::new();
        global.insert("perf_latency_p99".into(), ConstraintBound::max(50.0));
        let eval = ConstraintEvaluator::new().with_global_constraints(global);

        assert!(!eval.satisfies(&metrics("vgg16", "perf_latency_p99", 100.0)));
    }

    #[test]
    fn per_model_bound_is_tightened_by_global() {
        let mut model = ModelConstraints::new();
        model.insert("perf_latency_p99".into(), ConstraintBound::max(100.0));
        let mut global = ModelConstraints::new();
        global.insert("perf_latency_p99".into(), ConstraintBound::max(50.0));
        let eval = ConstraintEvaluator::new()
            .with_model_constraints("resnet50", model)
            .with_global_constraints(global);

        // Global's tighter (lower) max of 50 wins over the model's 100.
        assert!(!eval.satisfies(&metrics("resnet50", "perf_latency_p99", 75.0)));
    }

    #[test]
    fn compare_constraints_is_none_unless_both_fail() {
        let mut constraints = ModelConstraints::new();
        constraints.insert("perf_latency_p99".into(), ConstraintBound::max(50.0));
        let eval = ConstraintEvaluator::new().with_model_constraints("resnet50", constraints);

        let passing = metrics("resnet50", "perf_latency_p99", 10.0);
        let failing_a = metrics("resnet50", "perf_latency_p99", 60.0);
        let failing_b = metrics("resnet50", "perf_latency_p99", 100.0);

        assert_eq!(eval.compare_constraints(&passing, &failing_a), None);
        assert!(eval.compare_constraints(&failing_a, &failing_b).unwrap() < 0.0);
    }
}
