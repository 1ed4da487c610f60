//! §4.J Orchestrator: the single caller that drives a Run-Config
//! Generator to completion against the external collaborators, folding
//! every measurement into the Result Store and checkpointing after each
//! one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use indexmap::IndexMap;

use search_constraints::ConstraintEvaluator;
use search_core::Error;
use search_generate::{
    AutomaticModelConfigGenerator, BruteModelConfigGenerator, BruteRunConfigGenerator, ModelConfigGenerator,
    QuickDimension, QuickRunConfigGenerator, RunConfigCandidate, RunConfigGenerator, SearchTuning,
};
use search_space::{ModelProfileSpec, ParameterUsage, RunConfigSearchBounds, SearchParameter};
use search_store::{ResultStore, RunConfig, RunConfigMeasurement};
use search_variant::hashable_key;

use crate::collaborators::{InferenceServerController, MeasurementHarness, ModelRepositoryWriter, TelemetryMonitor};

/// Which run-config search strategy to use for a model set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Brute,
    Quick,
    Optuna,
}

/// Fixed per-run tunables the Orchestrator doesn't derive from the
/// profile: how many top configs Brute refines, how many trials Optuna
/// runs, and the checkpoint location.
pub struct OrchestratorConfig {
    pub strategy: Strategy,
    pub n_report: usize,
    pub max_trials: u32,
    /// Upper bound on Optuna trials as a percentage of the total derived
    /// search-space size; the effective budget is `min(max_trials,
    /// max_percentage_of_search_space / 100 * total_space_size)`.
    pub max_percentage_of_search_space: f64,
    pub checkpoint_dir: PathBuf,
    pub model_repo_base: PathBuf,
    pub max_retries: u32,
}

/// The parameters derived for one model, split the way the Run-Config
/// and Model-Config generators each need: runtime-layer `batch_sizes` and
/// load stay with the run-config generator, everything else (instance
/// group, queue delay) feeds the model-config generator.
struct SplitParams {
    other_dims: IndexMap<String, SearchParameter>,
    max_batch_size: Option<SearchParameter>,
    batch_sizes: Vec<i64>,
    load_param_name: &'static str,
    loads: Vec<i64>,
    explicit_load_given: bool,
}

fn split_params(params: IndexMap<String, SearchParameter>) -> SplitParams {
    let mut other_dims = IndexMap::new();
    let mut max_batch_size = None;
    let mut batch_sizes = Vec::new();
    let mut load_param_name = "concurrency";
    let mut loads = Vec::new();
    let mut explicit_load_given = false;

    for (name, param) in params {
        match name.as_str() {
            "max_batch_size" => max_batch_size = Some(param),
            "batch_sizes" => batch_sizes = param.realize_all(),
            "concurrency" => {
                load_param_name = "concurrency";
                explicit_load_given = matches!(param.category, search_space::ParameterCategory::IntList);
                loads = param.realize_all();
            }
            "request_rate" => {
                load_param_name = "request_rate";
                explicit_load_given = matches!(param.category, search_space::ParameterCategory::IntList);
                loads = param.realize_all();
            }
            _ if param.usage == ParameterUsage::Runtime => {}
            _ => {
                other_dims.insert(name, param);
            }
        }
    }

    SplitParams {
        other_dims,
        max_batch_size,
        batch_sizes,
        load_param_name,
        loads,
        explicit_load_given,
    }
}

/// Builds the per-model Model-Config Generator named by `automatic`.
fn build_model_config_generator(
    spec: &ModelProfileSpec,
    split: &SplitParams,
    automatic: bool,
    bounds: &RunConfigSearchBounds,
) -> Result<Box<dyn ModelConfigGenerator>, Error> {
    if automatic {
        let instance_bounds = (bounds.min_instance_count as i64, bounds.max_instance_count as i64);
        let batch_bounds = (bounds.min_model_batch_size as i64, bounds.max_model_batch_size as i64);
        let generator = AutomaticModelConfigGenerator::new(spec.model_name.clone(), spec.cpu_only, instance_bounds, batch_bounds, true)?;
        Ok(Box::new(generator))
    } else {
        if spec.is_ensemble_model {
            return Err(Error::EnsembleNotSupported(spec.model_name.clone()));
        }
        Ok(Box::new(BruteModelConfigGenerator::new(
            spec.model_name.clone(),
            spec.cpu_only,
            split.other_dims.clone(),
            split.max_batch_size.as_ref(),
        )))
    }
}

/// Builds the Run-Config Generator named by `strategy` for one model
/// profile, wiring in the per-model Model-Config Generator where the
/// chosen strategy needs one.
fn build_run_config_generator(
    spec: &ModelProfileSpec,
    bounds: &RunConfigSearchBounds,
    cfg: &OrchestratorConfig,
    tuning: SearchTuning,
) -> Result<Box<dyn RunConfigGenerator>, Error> {
    let params = search_space::derive_search_parameters(spec, bounds);
    let total_space_size = search_space::total_possible_configurations(&params);
    let split = split_params(params);

    match cfg.strategy {
        Strategy::Brute => {
            let model_config = build_model_config_generator(spec, &split, false, bounds)?;
            Ok(Box::new(BruteRunConfigGenerator::new(
                spec.model_name.clone(),
                model_config,
                split.load_param_name,
                split.batch_sizes,
                split.loads,
                split.explicit_load_given,
                cfg.n_report,
                tuning,
            )))
        }
        Strategy::Quick => {
            let mut dims = Vec::new();
            if let Some(max_batch_size) = &split.max_batch_size {
                dims.push(QuickDimension {
                    model_name: spec.model_name.clone(),
                    param_name: "max_batch_size".to_string(),
                    min_idx: 0,
                    max_idx: (max_batch_size.discrete_count() as i64 - 1).max(0),
                    exponential: true,
                });
            }
            let load_max_idx = (bounds.max_instance_count as f64).log2().ceil() as i64;
            dims.push(QuickDimension {
                model_name: spec.model_name.clone(),
                param_name: "instance_count".to_string(),
                min_idx: 0,
                max_idx: load_max_idx,
                exponential: false,
            });
            Ok(Box::new(QuickRunConfigGenerator::new(dims, tuning)))
        }
        Strategy::Optuna => {
            let mut params = Vec::new();
            if let Some(max_batch_size) = &split.max_batch_size {
                params.push(search_generate::OptunaParameter {
                    model_name: spec.model_name.clone(),
                    param_name: "max_batch_size".to_string(),
                    min_idx: 0,
                    max_idx: (max_batch_size.discrete_count() as i64 - 1).max(0),
                    exponential: true,
                });
            }
            const OPTUNA_SEED: u64 = 0x5EED_5EED_5EED_5EED;
            let trials_by_percentage =
                (total_space_size as f64 * cfg.max_percentage_of_search_space / 100.0) as u32;
            let max_trials = cfg.max_trials.min(trials_by_percentage);
            Ok(Box::new(search_generate::OptunaRunConfigGenerator::new(
                params,
                max_trials,
                max_trials.min(3),
                max_trials.min(5),
                cfg.n_report,
                false,
                split.load_param_name,
                (bounds.min_concurrency as i64, bounds.max_concurrency as i64),
                OPTUNA_SEED,
            )))
        }
    }
}

/// Drives one model profile's generator to completion, calling out to the
/// collaborators for every candidate and folding results into the store.
pub struct Orchestrator<'a> {
    store: ResultStore,
    evaluator: &'a ConstraintEvaluator,
    writer: &'a dyn ModelRepositoryWriter,
    server: &'a mut dyn InferenceServerController,
    harness: &'a mut dyn MeasurementHarness,
    telemetry: &'a mut dyn TelemetryMonitor,
    checkpoint_dir: PathBuf,
    model_repo_base: PathBuf,
    max_retries: u32,
    sequence: u64,
    currently_loaded: Option<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        cfg: &OrchestratorConfig,
        evaluator: &'a ConstraintEvaluator,
        writer: &'a dyn ModelRepositoryWriter,
        server: &'a mut dyn InferenceServerController,
        harness: &'a mut dyn MeasurementHarness,
        telemetry: &'a mut dyn TelemetryMonitor,
    ) -> search_core::Result<Self> {
        let store = latest_checkpoint(&cfg.checkpoint_dir)
            .map(|path| ResultStore::restore(&path))
            .transpose()?
            .unwrap_or_default();
        Ok(Orchestrator {
            store,
            evaluator,
            writer,
            server,
            harness,
            telemetry,
            checkpoint_dir: cfg.checkpoint_dir.clone(),
            model_repo_base: cfg.model_repo_base.clone(),
            max_retries: cfg.max_retries,
            sequence: 0,
            currently_loaded: None,
        })
    }

    pub fn result_store(&self) -> &ResultStore {
        &self.store
    }

    /// Runs one model profile's generator to exhaustion or until
    /// `shutdown` is set. Returns the number of measurements stored.
    /// Aborts with `Error::MeasurementDrought` after
    /// `tuning.measurement_drought_threshold` consecutive misses.
    pub fn drive(
        &mut self,
        spec: &ModelProfileSpec,
        bounds: &RunConfigSearchBounds,
        cfg: &OrchestratorConfig,
        tuning: SearchTuning,
        shutdown: &AtomicBool,
    ) -> search_core::Result<usize> {
        let mut generator = build_run_config_generator(spec, bounds, cfg, tuning)?;
        let mut stored = 0;
        let mut consecutive_misses = 0u32;

        while let Some(candidate) = generator.next_config(shutdown) {
            let (measurement, passes) = self.measure_once(&candidate)?;
            let was_stored = measurement.is_some();
            generator.set_last_result(measurement, passes);

            if was_stored {
                stored += 1;
                consecutive_misses = 0;
            } else {
                consecutive_misses += 1;
                if consecutive_misses >= tuning.measurement_drought_threshold {
                    return Err(Error::MeasurementDrought {
                        model: spec.model_name.clone(),
                        misses: consecutive_misses,
                    });
                }
            }
        }

        Ok(stored)
    }

    /// Measures one candidate, short-circuiting to a previously stored
    /// measurement when the Result Store already has this exact run
    /// (variant names + fingerprint) on resume.
    fn measure_once(&mut self, candidate: &RunConfigCandidate) -> search_core::Result<(Option<RunConfigMeasurement>, bool)> {
        let mut variant_names = Vec::new();
        for variant in &candidate.models {
            let name = self.store.variant_manager_mut().get_variant_name(&variant.base_model_name, &variant.param_combo);
            variant_names.push(name);
        }

        let run_key = variant_names.join(",");
        let fingerprint = hashable_key(&serde_json::to_value(&variant_names).unwrap_or_default());

        if let Some(cached) = self.store.get(&run_key, fingerprint) {
            let passes = self.store.passes_for(&run_key).unwrap_or(false);
            return Ok((Some(cached.clone()), passes));
        }

        for (variant, name) in candidate.models.iter().zip(&variant_names) {
            self.writer
                .write_variant(&self.model_repo_base, name, &variant.param_combo)
                .map_err(|e| search_core::Error::Other(e.to_string()))?;
        }

        if self.currently_loaded.as_deref() != Some(run_key.as_str()) {
            self.server.teardown().map_err(|e| search_core::Error::Other(e.to_string()))?;
            if let Some(first) = variant_names.first() {
                self.server
                    .prepare(first, &HashMap::new())
                    .map_err(|e| search_core::Error::Other(e.to_string()))?;
            }
            self.currently_loaded = Some(run_key.clone());
        }

        let run_config = RunConfig::new(variant_names.clone(), fingerprint);

        self.telemetry.start();
        let mut attempts = 0;
        let outcome = loop {
            let outcome = self
                .harness
                .run(&candidate.models, &HashMap::new())
                .map_err(|e| search_core::Error::Other(e.to_string()))?;
            if outcome.status != crate::collaborators::HarnessStatus::Retry || attempts >= self.max_retries {
                break outcome;
            }
            attempts += 1;
        };
        let gpu_data = self.telemetry.stop();

        if outcome.status != crate::collaborators::HarnessStatus::Ok {
            return Ok((None, false));
        }

        let mut rcm = RunConfigMeasurement::new(run_key.clone(), gpu_data);
        for variant in &candidate.models {
            rcm.add_model_config_measurement(search_store::ModelConfigMeasurement::new(
                run_key.clone(),
                variant.perf_params.clone(),
                outcome.records.clone(),
            ));
        }
        let passes = self.evaluator.satisfies(&rcm.data());
        self.store.add(&run_config, rcm.clone(), passes);
        self.sequence += 1;
        self.store.checkpoint(&self.checkpoint_dir, self.sequence)?;

        Ok((Some(rcm), passes))
    }
}

fn latest_checkpoint(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DemoHarness, DemoModelRepositoryWriter, DemoServerController, DemoTelemetryMonitor};
    use search_space::{ParametersSpec, RuntimeLoadSpec};

    fn profile() -> ModelProfileSpec {
        ModelProfileSpec::new(
            "resnet50",
            ParametersSpec {
                batch_sizes: Some(vec![1]),
                runtime_load: RuntimeLoadSpec::Concurrency(None),
            },
        )
    }

    #[test]
    fn drive_brute_strategy_stores_measurements() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = ConstraintEvaluator::new();
        let writer = DemoModelRepositoryWriter;
        let mut server = DemoServerController::default();
        let mut harness = DemoHarness::default();
        let mut telemetry = DemoTelemetryMonitor::default();

        let cfg = OrchestratorConfig {
            strategy: Strategy::Brute,
            n_report: 1,
            max_trials: 5,
            max_percentage_of_search_space: 100.0,
            checkpoint_dir: dir.path().to_path_buf(),
            model_repo_base: dir.path().join("models"),
            max_retries: 1,
        };

        let mut orchestrator = Orchestrator::new(&cfg, &evaluator, &writer, &mut server, &mut harness, &mut telemetry).unwrap();
        let bounds = RunConfigSearchBounds {
            max_concurrency: 4,
            ..RunConfigSearchBounds::default()
        };
        let shutdown = AtomicBool::new(false);
        let tuning = SearchTuning::default();

        let stored = orchestrator.drive(&profile(), &bounds, &cfg, tuning, &shutdown).unwrap();
        assert!(stored > 0);
        assert!(orchestrator.result_store().top_n(1, Some("resnet50"), false).len() <= 1);
    }

    #[test]
    fn shutdown_flag_stops_the_drive_loop_early() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = ConstraintEvaluator::new();
        let writer = DemoModelRepositoryWriter;
        let mut server = DemoServerController::default();
        let mut harness = DemoHarness::default();
        let mut telemetry = DemoTelemetryMonitor::default();

        let cfg = OrchestratorConfig {
            strategy: Strategy::Brute,
            n_report: 1,
            max_trials: 5,
            max_percentage_of_search_space: 100.0,
            checkpoint_dir: dir.path().to_path_buf(),
            model_repo_base: dir.path().join("models"),
            max_retries: 1,
        };

        let mut orchestrator = Orchestrator::new(&cfg, &evaluator, &writer, &mut server, &mut harness, &mut telemetry).unwrap();
        let bounds = RunConfigSearchBounds::default();
        let shutdown = AtomicBool::new(true);
        let tuning = SearchTuning::default();

        let stored = orchestrator.drive(&profile(), &bounds, &cfg, tuning, &shutdown).unwrap();
        assert_eq!(stored, 0);
    }
}
