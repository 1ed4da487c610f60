use std::collections::HashMap;
use std::sync::atomic::AtomicBool;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use search_store::RunConfigMeasurement;

use super::RunConfigGenerator;
use crate::candidate::{ModelVariantCandidate, RunConfigCandidate};
use crate::sweeper::InferenceLoadSweeper;
use crate::tuning::SearchTuning;

/// One parameter the sampler proposes a value for on every trial.
#[derive(Debug, Clone)]
pub struct OptunaParameter {
    pub model_name: String,
    pub param_name: String,
    pub min_idx: i64,
    pub max_idx: i64,
    pub exponential: bool,
}

impl OptunaParameter {
    fn realize(&self, idx: i64) -> i64 {
        if self.exponential {
            1i64 << idx
        } else {
            idx
        }
    }
}

const SCORE_SENTINEL: f64 = -1.0;

enum Phase {
    Baseline,
    Trials,
    ConcurrencySweep,
    Done,
}

/// TPE-flavored trial proposer. A full Tree-structured Parzen Estimator
/// is out of scope here; this reweights past good/bad trials into a
/// sampling distribution per parameter, which is the part of Optuna's
/// behavior that actually matters for this search: explore broadly at
/// first, then bias toward regions near past winners.
struct Sampler {
    rng: StdRng,
    good_observations: Vec<HashMap<String, i64>>,
    bad_observations: Vec<HashMap<String, i64>>,
}

impl Sampler {
    fn new(seed: u64) -> Self {
        Sampler {
            rng: StdRng::seed_from_u64(seed),
            good_observations: Vec::new(),
            bad_observations: Vec::new(),
        }
    }

    fn suggest(&mut self, params: &[OptunaParameter]) -> HashMap<String, i64> {
        let mut proposal = HashMap::new();
        let exploit = !self.good_observations.is_empty() && self.rng.gen_bool(0.7);
        let template = exploit.then(|| {
            let idx = self.rng.gen_range(0..self.good_observations.len());
            self.good_observations[idx].clone()
        });

        for param in params {
            let value = if let Some(template) = &template {
                let base = *template.get(&param.param_name).unwrap_or(&param.min_idx);
                // Gaussian kernel around the good observation, standard
                // Parzen-estimator-style local perturbation.
                let spread = ((param.max_idx - param.min_idx) as f64 / 6.0).max(0.5);
                let jitter = Normal::new(base as f64, spread)
                    .map(|normal| normal.sample(&mut self.rng).round() as i64)
                    .unwrap_or(base);
                jitter.clamp(param.min_idx, param.max_idx)
            } else {
                self.rng.gen_range(param.min_idx..=param.max_idx)
            };
            proposal.insert(param.param_name.clone(), value);
        }
        proposal
    }

    fn tell(&mut self, proposal: HashMap<String, i64>, score: f64) {
        if score > 0.0 {
            self.good_observations.push(proposal);
        } else {
            self.bad_observations.push(proposal);
        }
    }
}

/// TPE-style trial search plus a post-loop concurrency sweep over the
/// best-measured configs.
pub struct OptunaRunConfigGenerator {
    params: Vec<OptunaParameter>,
    sampler: Sampler,
    max_trials: u32,
    min_trials: u32,
    early_exit_threshold: u32,
    trial: u32,
    best_trial: u32,
    best_score: f64,
    baseline: Option<RunConfigMeasurement>,
    phase: Phase,
    pending_proposal: Option<HashMap<String, i64>>,
    top_for_sweep: Vec<(HashMap<String, i64>, f64)>,
    n_for_sweep: usize,
    sweep_disabled: bool,
    sweeper: Option<InferenceLoadSweeper>,
    sweep_queue_idx: usize,
    load_param_name: &'static str,
    load_bounds: (i64, i64),
}

impl OptunaRunConfigGenerator {
    pub fn new(
        params: Vec<OptunaParameter>,
        max_trials: u32,
        min_trials: u32,
        early_exit_threshold: u32,
        n_for_sweep: usize,
        sweep_disabled: bool,
        load_param_name: &'static str,
        load_bounds: (i64, i64),
        seed: u64,
    ) -> Self {
        OptunaRunConfigGenerator {
            params,
            sampler: Sampler::new(seed),
            max_trials,
            min_trials,
            early_exit_threshold,
            trial: 0,
            best_trial: 0,
            best_score: SCORE_SENTINEL,
            baseline: None,
            phase: Phase::Baseline,
            pending_proposal: None,
            top_for_sweep: Vec::new(),
            n_for_sweep,
            sweep_disabled,
            sweeper: None,
            sweep_queue_idx: 0,
            load_param_name,
            load_bounds,
        }
    }

    fn config_from(&self, proposal: &HashMap<String, i64>) -> RunConfigCandidate {
        let mut by_model: indexmap::IndexMap<String, HashMap<String, i64>> = indexmap::IndexMap::new();
        for param in &self.params {
            let idx = *proposal.get(&param.param_name).unwrap_or(&param.min_idx);
            by_model
                .entry(param.model_name.clone())
                .or_default()
                .insert(param.param_name.clone(), param.realize(idx));
        }
        let models = by_model
            .into_iter()
            .map(|(model_name, perf_params)| {
                ModelVariantCandidate::new(model_name, serde_json::Value::Object(serde_json::Map::new()), perf_params)
            })
            .collect();
        RunConfigCandidate::new(models)
    }

    fn record_for_sweep(&mut self, proposal: HashMap<String, i64>, score: f64) {
        self.top_for_sweep.push((proposal, score));
        self.top_for_sweep
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        self.top_for_sweep.truncate(self.n_for_sweep);
    }

    fn enter_sweep_phase(&mut self) {
        if self.sweep_disabled || self.top_for_sweep.is_empty() {
            self.phase = Phase::Done;
            return;
        }
        self.sweep_queue_idx = 0;
        self.phase = Phase::ConcurrencySweep;
    }
}

impl RunConfigGenerator for OptunaRunConfigGenerator {
    fn next_config(&mut self, shutdown: &AtomicBool) -> Option<RunConfigCandidate> {
        if shutdown.load(std::sync::atomic::Ordering::Relaxed) {
            self.phase = Phase::Done;
            return None;
        }

        match self.phase {
            Phase::Baseline => {
                self.pending_proposal = None;
                self.phase = Phase::Trials;
                Some(RunConfigCandidate::new(vec![]))
            }
            Phase::Trials => {
                if self.trial >= self.max_trials {
                    self.enter_sweep_phase();
                    return self.next_config(shutdown);
                }
                if self.trial.saturating_sub(self.best_trial) >= self.early_exit_threshold
                    && self.trial >= self.min_trials
                {
                    self.enter_sweep_phase();
                    return self.next_config(shutdown);
                }
                let proposal = self.sampler.suggest(&self.params);
                let config = self.config_from(&proposal);
                self.pending_proposal = Some(proposal);
                Some(config)
            }
            Phase::ConcurrencySweep => {
                if self.sweeper.is_none() {
                    if self.sweep_queue_idx >= self.top_for_sweep.len() {
                        self.phase = Phase::Done;
                        return None;
                    }
                    let min_idx = (self.load_bounds.0 as f64).log2() as i64;
                    let max_idx = (self.load_bounds.1 as f64).log2() as i64;
                    self.sweeper = Some(InferenceLoadSweeper::new(min_idx, max_idx, SearchTuning::default()));
                }
                let sweeper = self.sweeper.as_mut().unwrap();
                match sweeper.next(shutdown) {
                    Some(load) => {
                        let (proposal, _) = &self.top_for_sweep[self.sweep_queue_idx];
                        let mut candidate = self.config_from(proposal);
                        if let Some(model) = candidate.models.first_mut() {
                            model.perf_params.insert(self.load_param_name.to_string(), load as i64);
                        }
                        Some(candidate)
                    }
                    None => {
                        self.sweeper = None;
                        self.sweep_queue_idx += 1;
                        self.next_config(shutdown)
                    }
                }
            }
            Phase::Done => None,
        }
    }

    fn set_last_result(&mut self, measurement: Option<RunConfigMeasurement>, passes: bool) {
        match self.phase {
            Phase::Baseline => {
                self.baseline = measurement;
            }
            Phase::Trials => {
                let proposal = match self.pending_proposal.take() {
                    Some(p) => p,
                    None => return,
                };
                let score = match (&self.baseline, &measurement) {
                    (Some(baseline), Some(m)) => m.calculate_weighted_percentage_gain(baseline) / 100.0,
                    _ => SCORE_SENTINEL,
                };
                self.sampler.tell(proposal.clone(), score);
                if score > self.best_score {
                    self.best_score = score;
                    self.best_trial = self.trial;
                }
                if passes {
                    self.record_for_sweep(proposal, score);
                }
                self.trial += 1;
            }
            Phase::ConcurrencySweep => {
                if let Some(sweeper) = self.sweeper.as_mut() {
                    let (_, _score) = &self.top_for_sweep[self.sweep_queue_idx];
                    let value = measurement
                        .as_ref()
                        .and_then(|m| m.model_config_measurements().first())
                        .and_then(|mcm| mcm.model_specific_params.get(self.load_param_name).copied())
                        .unwrap_or(0) as u64;
                    sweeper.set_last_result(value, passes, measurement);
                }
            }
            Phase::Done => {}
        }
    }
}
