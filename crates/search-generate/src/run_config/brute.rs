use std::collections::HashMap;
use std::sync::atomic::AtomicBool;

use search_store::RunConfigMeasurement;

use super::RunConfigGenerator;
use crate::candidate::{ModelVariantCandidate, RunConfigCandidate};
use crate::concurrency_sweep::ConcurrencySweepStage;
use crate::model_config::ModelConfigGenerator;
use crate::tuning::SearchTuning;

enum Phase {
    /// Cross every per-model-config variant with every `batch_sizes × load`
    /// combination.
    Sweep,
    /// Binary-search refinement of the load boundary around each of the
    /// top `N_report` measurements, entered only when the user did not
    /// supply an explicit load list.
    Refine,
    Done,
}

struct TopEntry {
    perf_params: HashMap<String, i64>,
    throughput: f64,
}

/// Brute + Binary Parameter Search, scoped to a single model: phase 1
/// walks the full cartesian product of the model-config generator's
/// variants and the declared `batch_sizes × load` values; phase 2 refines
/// the load boundary for the best-measured configs via the
/// Inference-Load Sweeper's binary phase.
pub struct BruteRunConfigGenerator {
    base_model_name: String,
    model_config: Box<dyn ModelConfigGenerator>,
    load_param_name: &'static str,
    batch_sizes: Vec<i64>,
    loads: Vec<i64>,
    batch_idx: usize,
    load_idx: usize,
    phase: Phase,
    explicit_load_given: bool,
    n_report: usize,
    top: Vec<TopEntry>,
    refine: ConcurrencySweepStage<()>,
    best_throughput_in_row: Option<f64>,
    any_error_in_row: bool,
}

impl BruteRunConfigGenerator {
    pub fn new(
        base_model_name: impl Into<String>,
        model_config: Box<dyn ModelConfigGenerator>,
        load_param_name: &'static str,
        batch_sizes: Vec<i64>,
        loads: Vec<i64>,
        explicit_load_given: bool,
        n_report: usize,
        tuning: SearchTuning,
    ) -> Self {
        BruteRunConfigGenerator {
            base_model_name: base_model_name.into(),
            model_config,
            load_param_name,
            batch_sizes: if batch_sizes.is_empty() { vec![1] } else { batch_sizes },
            loads: if loads.is_empty() { vec![1] } else { loads },
            batch_idx: 0,
            load_idx: 0,
            phase: Phase::Sweep,
            explicit_load_given,
            n_report,
            top: Vec::new(),
            refine: ConcurrencySweepStage::new(tuning),
            best_throughput_in_row: None,
            any_error_in_row: false,
        }
    }

    fn current_candidate(&self) -> ModelVariantCandidate {
        let mut variant = self.model_config.get_next_model_config_variant();
        variant
            .perf_params
            .insert("batch_sizes".to_string(), self.batch_sizes[self.batch_idx]);
        variant
            .perf_params
            .insert(self.load_param_name.to_string(), self.loads[self.load_idx]);
        variant
    }

    /// Advances the `batch_sizes × load` cursor. Returns `false` once the
    /// row is exhausted for the current model-config variant.
    fn advance_row_cursor(&mut self) -> bool {
        self.load_idx += 1;
        if self.load_idx >= self.loads.len() {
            self.load_idx = 0;
            self.batch_idx += 1;
            if self.batch_idx >= self.batch_sizes.len() {
                self.batch_idx = 0;
                return false;
            }
        }
        true
    }

    fn record_top(&mut self, entry: TopEntry) {
        self.top.push(entry);
        self.top
            .sort_by(|a, b| b.throughput.partial_cmp(&a.throughput).unwrap_or(std::cmp::Ordering::Equal));
        self.top.truncate(self.n_report);
    }

    fn enter_refine_phase(&mut self) {
        if self.explicit_load_given || self.top.is_empty() {
            self.phase = Phase::Done;
            return;
        }
        let candidates = self
            .top
            .drain(..)
            .map(|entry| ((), *entry.perf_params.get(self.load_param_name).unwrap_or(&1)))
            .collect();
        self.refine.start(candidates);
        self.phase = Phase::Refine;
    }
}

impl RunConfigGenerator for BruteRunConfigGenerator {
    fn next_config(&mut self, shutdown: &AtomicBool) -> Option<RunConfigCandidate> {
        match self.phase {
            Phase::Sweep => {
                if self.model_config.done_walking() {
                    self.enter_refine_phase();
                    return self.next_config(shutdown);
                }
                Some(RunConfigCandidate::new(vec![self.current_candidate()]))
            }
            Phase::Refine => match self.refine.next(shutdown) {
                Some((_, load)) => {
                    let mut perf_params = HashMap::new();
                    perf_params.insert(self.load_param_name.to_string(), load as i64);
                    Some(RunConfigCandidate::new(vec![ModelVariantCandidate::new(
                        self.base_model_name.clone(),
                        serde_json::Value::Object(serde_json::Map::new()),
                        perf_params,
                    )]))
                }
                None if self.refine.is_exhausted() => {
                    self.phase = Phase::Done;
                    None
                }
                None => self.next_config(shutdown),
            },
            Phase::Done => None,
        }
    }

    fn set_last_result(&mut self, measurement: Option<RunConfigMeasurement>, passes: bool) {
        match self.phase {
            Phase::Sweep => {
                let throughput = measurement
                    .as_ref()
                    .and_then(|m| m.model_config_measurements().first())
                    .map(|mcm| mcm.get_metric_value("perf_throughput", 0.0));

                if let (Some(value), true) = (throughput, passes) {
                    let candidate = self.current_candidate();
                    self.record_top(TopEntry {
                        perf_params: candidate.perf_params,
                        throughput: value,
                    });
                    self.best_throughput_in_row = Some(self.best_throughput_in_row.map_or(value, |b| b.max(value)));
                }
                self.any_error_in_row = self.any_error_in_row || measurement.is_none();

                if !self.advance_row_cursor() {
                    let last_batch_throughput = self.best_throughput_in_row.take();
                    let errored = self.any_error_in_row;
                    self.any_error_in_row = false;
                    self.model_config.step(last_batch_throughput, errored);
                }
            }
            Phase::Refine => {
                let value = measurement
                    .as_ref()
                    .and_then(|m| {
                        m.model_config_measurements()
                            .first()
                            .map(|mcm| mcm.model_specific_params.get(self.load_param_name).copied())
                    })
                    .flatten()
                    .unwrap_or(0) as u64;
                self.refine.set_last_result(value, passes, measurement);
            }
            Phase::Done => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_config::BruteModelConfigGenerator;
    use indexmap::IndexMap;
    use search_space::{ParameterUsage, ParameterValues, SearchParameter};
    use search_store::ModelConfigMeasurement;
    use search_record::Record;

    fn model_config_gen() -> Box<dyn ModelConfigGenerator> {
        let mut dims = IndexMap::new();
        dims.insert(
            "instance_group".to_string(),
            SearchParameter::new("instance_group", ParameterUsage::Model, ParameterValues::IntList(vec![1])),
        );
        Box::new(BruteModelConfigGenerator::new("resnet50", false, dims, None))
    }

    #[test]
    fn sweep_phase_yields_batch_times_load_combinations() {
        let mut gen = BruteRunConfigGenerator::new(
            "resnet50",
            model_config_gen(),
            "concurrency",
            vec![1, 2],
            vec![4, 8],
            false,
            1,
            SearchTuning::default(),
        );
        let shutdown = AtomicBool::new(false);

        let mut seen = Vec::new();
        while let Some(candidate) = gen.next_config(&shutdown) {
            let variant = &candidate.models[0];
            seen.push((
                variant.perf_params["batch_sizes"],
                variant.perf_params["concurrency"],
            ));
            if seen.len() >= 4 {
                gen.set_last_result(None, false);
                break;
            }
            gen.set_last_result(None, false);
        }
        assert_eq!(seen.len(), 4);
        assert!(seen.contains(&(1, 4)));
        assert!(seen.contains(&(2, 8)));
    }

    #[test]
    fn explicit_load_skips_refine_phase() {
        let mut gen = BruteRunConfigGenerator::new(
            "resnet50",
            model_config_gen(),
            "concurrency",
            vec![1],
            vec![4],
            true,
            1,
            SearchTuning::default(),
        );
        let shutdown = AtomicBool::new(false);
        let mut rcm = RunConfigMeasurement::new("resnet50_config_default", HashMap::new());
        rcm.add_model_config_measurement(ModelConfigMeasurement::new(
            "resnet50_config_default",
            HashMap::new(),
            vec![Record::new("perf_throughput", 100.0)],
        ));
        gen.next_config(&shutdown);
        gen.set_last_result(Some(rcm), true);
        assert!(gen.next_config(&shutdown).is_none());
    }
}
