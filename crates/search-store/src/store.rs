use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use search_variant::VariantNameManager;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::rcm::RunConfigMeasurement;

/// Identifies one measured run: the variants measured together, and the
/// hash of the full run configuration (variants + perf params +
/// environment) used to recognize a repeat of the exact same run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub variant_names: Vec<String>,
    pub fingerprint: u64,
}

impl RunConfig {
    pub fn new(variant_names: Vec<String>, fingerprint: u64) -> Self {
        RunConfig {
            variant_names,
            fingerprint,
        }
    }

    /// The store key: MCM variant names joined by `,`.
    pub fn variant_key(&self) -> String {
        self.variant_names.join(",")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunConfigResult {
    variant_key: String,
    measurements: Vec<(u64, RunConfigMeasurement)>,
    passes: bool,
}

impl RunConfigResult {
    fn best(&self) -> &RunConfigMeasurement {
        let mut best = &self.measurements[0].1;
        for (_, measurement) in &self.measurements[1..] {
            if measurement.is_better_than(best) {
                best = measurement;
            }
        }
        best
    }

    fn involves_model(&self, model_name: &str) -> bool {
        self.best()
            .model_config_measurements()
            .iter()
            .any(|mcm| mcm.model_name() == model_name)
    }
}

/// The full checkpoint document: every run-config result plus the variant
/// naming state needed to keep minting names consistently across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointDocument {
    results: Vec<RunConfigResult>,
    variant_manager: VariantNameManager,
}

/// Sorted, deduped, checkpointable store of `(variant key -> measurements)`.
pub struct ResultStore {
    results: HashMap<String, RunConfigResult>,
    variant_manager: VariantNameManager,
}

impl ResultStore {
    pub fn new() -> Self {
        ResultStore {
            results: HashMap::new(),
            variant_manager: VariantNameManager::new(),
        }
    }

    pub fn variant_manager_mut(&mut self) -> &mut VariantNameManager {
        &mut self.variant_manager
    }

    pub fn contains(&self, variant_key: &str) -> bool {
        self.results.contains_key(variant_key)
    }

    /// Looks up a previously stored measurement for this exact run
    /// (variant key + fingerprint), used to skip duplicate *runs* rather
    /// than duplicate variants.
    pub fn get(&self, variant_key: &str, fingerprint: u64) -> Option<&RunConfigMeasurement> {
        self.results.get(variant_key).and_then(|result| {
            result
                .measurements
                .iter()
                .find(|(fp, _)| *fp == fingerprint)
                .map(|(_, measurement)| measurement)
        })
    }

    /// The merged pass/fail state recorded for a variant key, if any run
    /// has been added under it.
    pub fn passes_for(&self, variant_key: &str) -> Option<bool> {
        self.results.get(variant_key).map(|r| r.passes)
    }

    /// Appends a measurement; merges into the existing entry for this
    /// variant key rather than duplicating it.
    pub fn add(&mut self, run_config: &RunConfig, measurement: RunConfigMeasurement, passes: bool) {
        let key = run_config.variant_key();
        let entry = self.results.entry(key.clone()).or_insert_with(|| RunConfigResult {
            variant_key: key.clone(),
            measurements: Vec::new(),
            passes,
        });
        entry.measurements.push((run_config.fingerprint, measurement));
        entry.passes = entry.passes || passes;
    }

    /// Top `n` results, optionally restricted to run configs involving
    /// `model_name`. Falls back to failing configurations (with a warning)
    /// when fewer than `n` passing ones exist; `include_default` pulls in
    /// `<model_name>_config_default` even if it didn't make the cut.
    pub fn top_n(&self, n: usize, model_name: Option<&str>, include_default: bool) -> Vec<&RunConfigMeasurement> {
        let candidates: Vec<&RunConfigResult> = self
            .results
            .values()
            .filter(|r| model_name.map_or(true, |m| r.involves_model(m)))
            .collect();

        let mut passing: Vec<&RunConfigResult> = candidates.iter().copied().filter(|r| r.passes).collect();
        passing.sort_by(|a, b| {
            b.best()
                .partial_cmp(a.best())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut selected: Vec<&RunConfigResult> = if passing.is_empty() {
            warn!("requested top {n} configs, but none satisfied constraints; showing failing configs instead");
            let mut failing: Vec<&RunConfigResult> = candidates.iter().copied().filter(|r| !r.passes).collect();
            failing.sort_by(|a, b| {
                b.best()
                    .partial_cmp(a.best())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            if failing.len() < n {
                warn!(
                    "requested top {n} failing configs, but found only {}; showing all available",
                    failing.len()
                );
            }
            failing.into_iter().take(n).collect()
        } else {
            if passing.len() < n {
                warn!(
                    "requested top {n} configs, but found only {} passing; showing all available",
                    passing.len()
                );
            }
            passing.into_iter().take(n).collect()
        };

        if include_default {
            if let Some(model_name) = model_name {
                let default_key = format!("{model_name}_config_default");
                if let Some(default_result) = self.results.get(&default_key) {
                    if !selected.iter().any(|r| r.variant_key == default_key) {
                        selected.push(default_result);
                    }
                }
            }
        }

        selected.into_iter().map(|r| r.best()).collect()
    }

    /// Atomically checkpoints the entire store plus variant-naming state:
    /// serialize to a staging file, then rename over the sequenced target
    /// so a crash mid-write never corrupts the prior checkpoint.
    pub fn checkpoint(&self, directory: &Path, sequence: u64) -> search_core::Result<PathBuf> {
        fs::create_dir_all(directory)?;
        let target = directory.join(format!("checkpoint_{sequence:010}.json"));
        let staging = directory.join(format!("checkpoint_{sequence:010}.json.tmp"));

        let document = CheckpointDocument {
            results: self.results.values().cloned().collect(),
            variant_manager: self.variant_manager.clone(),
        };
        let serialized = serde_json::to_vec_pretty(&document)?;
        fs::write(&staging, serialized)?;
        fs::rename(&staging, &target)?;

        info!(sequence, path = %target.display(), "wrote checkpoint");
        Ok(target)
    }

    pub fn restore(path: &Path) -> search_core::Result<Self> {
        let contents = fs::read(path)?;
        let document: CheckpointDocument = serde_json::from_slice(&contents)?;
        let results = document
            .results
            .into_iter()
            .map(|r| (r.variant_key.clone(), r))
            .collect();
        Ok(ResultStore {
            results,
            variant_manager: document.variant_manager,
        })
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}
