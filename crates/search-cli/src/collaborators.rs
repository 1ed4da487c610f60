//! External collaborator traits (§6): the engine never speaks to a model
//! repository, an inference server, a measurement harness, or a telemetry
//! stack directly. It only calls out through these traits; the demo
//! binary wires in synthetic implementations so the orchestrator can run
//! end to end without a real Triton deployment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use search_generate::ModelVariantCandidate;
use search_record::Record;
use serde_json::Value;

/// Writes a variant's config document to disk, overlaid on the model's
/// base config.
pub trait ModelRepositoryWriter {
    fn write_variant(&self, base_path: &Path, variant_name: &str, param_combo: &Value) -> anyhow::Result<PathBuf>;
}

/// Controls the inference server's loaded model set. `prepare` loads (or
/// reloads) the given variant; `teardown` unloads whatever is currently
/// loaded.
pub trait InferenceServerController {
    fn prepare(&mut self, variant_name: &str, env: &HashMap<String, String>) -> anyhow::Result<()>;
    fn teardown(&mut self) -> anyhow::Result<()>;
    fn is_ready(&self) -> bool;
}

/// Outcome of one harness invocation. `Retry` means the caller should
/// re-emit the same config with adjusted parameters, up to `max_retries`
/// times, before giving up and treating it as a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessStatus {
    Ok,
    Fail,
    Retry,
}

#[derive(Debug, Clone)]
pub struct HarnessOutcome {
    pub records: Vec<Record>,
    pub status: HarnessStatus,
}

/// Runs one or more model variants together and reports the metrics it
/// observed.
pub trait MeasurementHarness {
    fn run(&mut self, variants: &[ModelVariantCandidate], env: &HashMap<String, String>) -> anyhow::Result<HarnessOutcome>;
}

/// An opaque monitor started before a harness `run` and stopped after,
/// returning records tagged by device identifier.
pub trait TelemetryMonitor {
    fn start(&mut self);
    fn stop(&mut self) -> HashMap<String, Vec<Record>>;
}

/// Writes each variant's config document under `base_path/<variant_name>/config.json`,
/// overlaying the param combo onto an empty base document (a real writer would
/// merge onto the model's fetched default config instead).
pub struct DemoModelRepositoryWriter;

impl ModelRepositoryWriter for DemoModelRepositoryWriter {
    fn write_variant(&self, base_path: &Path, variant_name: &str, param_combo: &Value) -> anyhow::Result<PathBuf> {
        let dir = base_path.join(variant_name);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("config.json");
        std::fs::write(&path, serde_json::to_vec_pretty(param_combo)?)?;
        Ok(path)
    }
}

/// Tracks the currently-loaded variant name without talking to a real
/// server; `prepare` is a no-op reload, `teardown` clears it.
#[derive(Default)]
pub struct DemoServerController {
    loaded: Option<String>,
}

impl InferenceServerController for DemoServerController {
    fn prepare(&mut self, variant_name: &str, _env: &HashMap<String, String>) -> anyhow::Result<()> {
        self.loaded = Some(variant_name.to_string());
        Ok(())
    }

    fn teardown(&mut self) -> anyhow::Result<()> {
        self.loaded = None;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.loaded.is_some()
    }
}

/// A deterministic, noise-free synthetic harness: throughput grows
/// linearly with load up to a per-model saturation point, then flattens;
/// latency grows linearly with load. Lets the demo binary and tests
/// exercise the full search loop without perf_analyzer or a GPU.
pub struct DemoHarness {
    pub saturation_throughput: f64,
    pub throughput_per_unit_load: f64,
    pub latency_per_unit_load: f64,
}

impl Default for DemoHarness {
    fn default() -> Self {
        DemoHarness {
            saturation_throughput: 1000.0,
            throughput_per_unit_load: 100.0,
            latency_per_unit_load: 10.0,
        }
    }
}

impl MeasurementHarness for DemoHarness {
    fn run(&mut self, variants: &[ModelVariantCandidate], _env: &HashMap<String, String>) -> anyhow::Result<HarnessOutcome> {
        let mut records = Vec::new();
        for variant in variants {
            let load = variant
                .perf_params
                .get("concurrency")
                .or_else(|| variant.perf_params.get("request_rate"))
                .copied()
                .unwrap_or(1) as f64;
            let batch = variant.perf_params.get("batch_sizes").copied().unwrap_or(1) as f64;

            let throughput = (self.throughput_per_unit_load * load * batch.sqrt()).min(self.saturation_throughput);
            let latency = self.latency_per_unit_load * load;

            records.push(Record::new("perf_throughput", throughput));
            records.push(Record::new("perf_latency_p99", latency));
        }
        Ok(HarnessOutcome {
            records,
            status: HarnessStatus::Ok,
        })
    }
}

/// No GPUs to monitor in the demo; returns an empty device map.
#[derive(Default)]
pub struct DemoTelemetryMonitor;

impl TelemetryMonitor for DemoTelemetryMonitor {
    fn start(&mut self) {}

    fn stop(&mut self) -> HashMap<String, Vec<Record>> {
        HashMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_writer_writes_config_under_variant_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DemoModelRepositoryWriter;
        let path = writer
            .write_variant(dir.path(), "resnet50_config_0", &serde_json::json!({"max_batch_size": 8}))
            .unwrap();
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), "config.json");
    }

    #[test]
    fn demo_server_controller_tracks_loaded_variant() {
        let mut controller = DemoServerController::default();
        assert!(!controller.is_ready());
        controller.prepare("resnet50_config_0", &HashMap::new()).unwrap();
        assert!(controller.is_ready());
        controller.teardown().unwrap();
        assert!(!controller.is_ready());
    }

    #[test]
    fn demo_harness_throughput_saturates() {
        let mut harness = DemoHarness::default();
        let mut params = HashMap::new();
        params.insert("concurrency".to_string(), 1024);
        let variant = ModelVariantCandidate::new("resnet50", Value::Object(serde_json::Map::new()), params);

        let outcome = harness.run(&[variant], &HashMap::new()).unwrap();
        let throughput = outcome.records.iter().find(|r| r.tag == "perf_throughput").unwrap();
        assert_eq!(throughput.value(), 1000.0);
    }
}
