use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use search_constraints::ConstraintEvaluator;
use search_generate::SearchTuning;
use search_space::{ModelProfileSpec, RunConfigSearchBounds};

mod collaborators;
mod orchestrator;

use collaborators::{DemoHarness, DemoModelRepositoryWriter, DemoServerController, DemoTelemetryMonitor};
use orchestrator::{Orchestrator, OrchestratorConfig, Strategy};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Brute,
    Quick,
    Optuna,
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Brute => Strategy::Brute,
            StrategyArg::Quick => Strategy::Quick,
            StrategyArg::Optuna => Strategy::Optuna,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "search-engine", about = "Profile one model against a synthetic demo harness")]
struct Args {
    /// Path to a JSON-encoded model profile
    #[arg(long = "profile")]
    profile: PathBuf,

    /// Directory checkpoints are written to and restored from
    #[arg(long = "checkpoint-dir", default_value = "./checkpoints")]
    checkpoint_dir: PathBuf,

    /// Directory the demo model-repository writer stages variant configs under
    #[arg(long = "model-repo", default_value = "./model_repo")]
    model_repo: PathBuf,

    /// Run-config search strategy
    #[arg(long = "strategy", value_enum, default_value = "brute")]
    strategy: StrategyArg,

    /// Number of top measurements Brute/Optuna carry into their refinement phase
    #[arg(long = "n-report", default_value_t = 3)]
    n_report: usize,

    /// Maximum trials for the Optuna strategy
    #[arg(long = "max-trials", default_value_t = 20)]
    max_trials: u32,

    /// Upper bound on Optuna trials as a percentage of the total derived search-space size
    #[arg(long = "max-percentage-of-search-space", default_value_t = 10.0)]
    max_percentage_of_search_space: f64,

    /// Harness retries before a config is treated as a miss
    #[arg(long = "max-retries", default_value_t = 2)]
    max_retries: u32,

    /// Stop the search after this many seconds (cooperative; finishes the in-flight measurement)
    #[arg(long = "duration-secs")]
    duration_secs: Option<u64>,
}

fn load_profile(path: &PathBuf) -> anyhow::Result<ModelProfileSpec> {
    let contents = fs::read(path)?;
    let spec = serde_json::from_slice(&contents)?;
    Ok(spec)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let spec = load_profile(&args.profile)?;
    let bounds = RunConfigSearchBounds::default();
    let tuning = SearchTuning::default();
    let evaluator = spec
        .constraints
        .clone()
        .map(|constraints| ConstraintEvaluator::new().with_model_constraints(spec.model_name.clone(), constraints))
        .unwrap_or_default();

    let cfg = OrchestratorConfig {
        strategy: args.strategy.into(),
        n_report: args.n_report,
        max_trials: args.max_trials,
        max_percentage_of_search_space: args.max_percentage_of_search_space,
        checkpoint_dir: args.checkpoint_dir.clone(),
        model_repo_base: args.model_repo.clone(),
        max_retries: args.max_retries,
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    if let Some(secs) = args.duration_secs {
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            shutdown.store(true, Ordering::Relaxed);
        });
    }

    let writer = DemoModelRepositoryWriter;
    let mut server = DemoServerController::default();
    let mut harness = DemoHarness::default();
    let mut telemetry = DemoTelemetryMonitor::default();

    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        progress.set_style(style);
    }
    progress.set_message(format!("profiling {}", spec.model_name));
    progress.enable_steady_tick(Duration::from_millis(120));

    let mut orchestrator = Orchestrator::new(&cfg, &evaluator, &writer, &mut server, &mut harness, &mut telemetry)?;
    let stored = orchestrator.drive(&spec, &bounds, &cfg, tuning, &shutdown)?;

    progress.finish_with_message(format!("stored {stored} measurement(s)"));

    for (rank, measurement) in orchestrator
        .result_store()
        .top_n(args.n_report, Some(&spec.model_name), true)
        .into_iter()
        .enumerate()
    {
        eprintln!("#{}: {}", rank + 1, measurement.model_variants_name());
        if let Some(throughput) = measurement
            .model_config_measurements()
            .first()
            .and_then(|mcm| mcm.get_metric("perf_throughput"))
        {
            eprintln!("    perf_throughput = {:.1}", throughput.value());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_profile_parses_a_minimal_profile_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        let spec = ModelProfileSpec::new(
            "resnet50",
            search_space::ParametersSpec {
                batch_sizes: Some(vec![1, 2]),
                runtime_load: search_space::RuntimeLoadSpec::Concurrency(None),
            },
        );
        std::fs::write(&path, serde_json::to_vec(&spec).unwrap()).unwrap();

        let loaded = load_profile(&path).unwrap();
        assert_eq!(loaded.model_name, "resnet50");
    }

    #[test]
    fn strategy_arg_maps_onto_the_engine_strategy() {
        assert!(matches!(Strategy::from(StrategyArg::Brute), Strategy::Brute));
        assert!(matches!(Strategy::from(StrategyArg::Optuna), Strategy::Optuna));
    }
}
