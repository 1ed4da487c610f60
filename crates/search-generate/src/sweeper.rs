use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use search_store::RunConfigMeasurement;

use crate::tuning::SearchTuning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepPhase {
    Sweep,
    Binary,
    Done,
}

struct Observation {
    value: u64,
    passes: bool,
    measurement: Option<RunConfigMeasurement>,
}

/// Drives a sweep over one scalar inference load (concurrency or
/// request-rate): an exponential sweep phase with early exit on gain
/// saturation, then boundary detection and a binary-search refinement
/// phase around the pass/fail boundary.
pub struct InferenceLoadSweeper {
    min_idx: i64,
    max_idx: i64,
    current_idx: i64,
    phase: SweepPhase,
    tuning: SearchTuning,
    history: Vec<Observation>,
    last_passing: Option<u64>,
    last_failing: Option<u64>,
    last_emitted_binary: Option<u64>,
    binary_steps_taken: u32,
}

impl InferenceLoadSweeper {
    pub fn new(min_idx: i64, max_idx: i64, tuning: SearchTuning) -> Self {
        InferenceLoadSweeper {
            min_idx,
            max_idx,
            current_idx: min_idx,
            phase: SweepPhase::Sweep,
            tuning,
            history: Vec::new(),
            last_passing: None,
            last_failing: None,
            last_emitted_binary: None,
            binary_steps_taken: 0,
        }
    }

    /// Constructs a sweeper that skips straight to the binary phase between
    /// an already-known passing/failing pair, per the Brute generator's
    /// phase-2 refinement of a prior sweep's boundary.
    pub fn skip_to_binary(last_passing: u64, last_failing: u64, tuning: SearchTuning) -> Self {
        InferenceLoadSweeper {
            min_idx: 0,
            max_idx: 0,
            current_idx: 0,
            phase: SweepPhase::Binary,
            tuning,
            history: Vec::new(),
            last_passing: Some(last_passing),
            last_failing: Some(last_failing),
            last_emitted_binary: None,
            binary_steps_taken: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase == SweepPhase::Done
    }

    /// The next load value to measure, or `None` once the sweeper is done
    /// or the caller has signaled shutdown.
    pub fn next(&mut self, shutdown: &AtomicBool) -> Option<u64> {
        if shutdown.load(AtomicOrdering::Relaxed) {
            self.phase = SweepPhase::Done;
            return None;
        }

        match self.phase {
            SweepPhase::Sweep => {
                if self.current_idx > self.max_idx {
                    self.enter_binary_phase();
                    return self.next(shutdown);
                }
                let value = 1u64 << self.current_idx;
                self.current_idx += 1;
                Some(value)
            }
            SweepPhase::Binary => self.next_binary_value(),
            SweepPhase::Done => None,
        }
    }

    /// Feeds back the result of the most recently emitted value.
    pub fn set_last_result(&mut self, value: u64, passes: bool, measurement: Option<RunConfigMeasurement>) {
        match self.phase {
            SweepPhase::Sweep => {
                self.history.push(Observation {
                    value,
                    passes,
                    measurement,
                });
                if self.gain_has_saturated() {
                    self.enter_binary_phase();
                }
            }
            SweepPhase::Binary => {
                if passes {
                    self.last_passing = Some(value);
                } else {
                    self.last_failing = Some(value);
                }
                self.binary_steps_taken += 1;
                if self.binary_steps_taken >= self.tuning.max_binary_search_steps {
                    self.phase = SweepPhase::Done;
                }
            }
            SweepPhase::Done => {}
        }
    }

    fn gain_has_saturated(&self) -> bool {
        let t_min = self.tuning.throughput_min_consecutive_tries as usize;
        if self.history.len() < t_min {
            return false;
        }
        let window = &self.history[self.history.len() - t_min..];
        let first = window.first().and_then(|o| o.measurement.as_ref());
        let best = window
            .iter()
            .filter_map(|o| o.measurement.as_ref())
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        match (best, first) {
            (Some(best), Some(first)) => {
                let gain = best.calculate_weighted_percentage_gain(first) / 100.0;
                gain < self.tuning.gain_min
            }
            _ => false,
        }
    }

    fn enter_binary_phase(&mut self) {
        self.detect_boundary();
        if self.last_failing.is_none() {
            // Nothing failed during the sweep: no boundary to refine.
            tracing::debug!("sweep found no failing load; skipping binary phase");
            self.phase = SweepPhase::Done;
        } else {
            tracing::debug!(
                last_passing = ?self.last_passing,
                last_failing = ?self.last_failing,
                "entering binary search phase"
            );
            self.phase = SweepPhase::Binary;
        }
    }

    /// Walks the sweep history newest-to-oldest; the first adjacent
    /// fail-then-pass pair is the boundary. If even the first emitted
    /// value failed, the boundary is between 0 and that value.
    fn detect_boundary(&mut self) {
        for i in (1..self.history.len()).rev() {
            if !self.history[i].passes && self.history[i - 1].passes {
                self.last_passing = Some(self.history[i - 1].value);
                self.last_failing = Some(self.history[i].value);
                return;
            }
        }
        if let Some(first) = self.history.first() {
            if !first.passes {
                self.last_passing = None;
                self.last_failing = Some(first.value);
            }
        }
    }

    fn next_binary_value(&mut self) -> Option<u64> {
        let failing = self.last_failing?;
        let passing = self.last_passing.unwrap_or(0);
        if self.binary_steps_taken >= self.tuning.max_binary_search_steps {
            self.phase = SweepPhase::Done;
            return None;
        }
        let midpoint = passing + (failing - passing) / 2;
        if Some(midpoint) == self.last_emitted_binary || midpoint == passing || midpoint == failing {
            self.phase = SweepPhase::Done;
            return None;
        }
        self.last_emitted_binary = Some(midpoint);
        Some(midpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_record::Record;
    use search_store::ModelConfigMeasurement;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;

    fn rcm(name: &str, throughput: f64) -> RunConfigMeasurement {
        let mut rcm = RunConfigMeasurement::new(name, HashMap::new());
        rcm.add_model_config_measurement(ModelConfigMeasurement::new(
            name,
            HashMap::new(),
            vec![Record::new("perf_throughput", throughput)],
        ));
        rcm
    }

    #[test]
    fn sweep_emits_powers_of_two() {
        let shutdown = AtomicBool::new(false);
        let mut sweeper = InferenceLoadSweeper::new(0, 2, SearchTuning::default());
        assert_eq!(sweeper.next(&shutdown), Some(1));
        sweeper.set_last_result(1, true, Some(rcm("m", 100.0)));
        assert_eq!(sweeper.next(&shutdown), Some(2));
        sweeper.set_last_result(2, true, Some(rcm("m", 100.0)));
        assert_eq!(sweeper.next(&shutdown), Some(4));
        sweeper.set_last_result(4, true, Some(rcm("m", 100.0)));
    }

    #[test]
    fn shutdown_signal_terminates_immediately() {
        let shutdown = AtomicBool::new(true);
        let mut sweeper = InferenceLoadSweeper::new(0, 4, SearchTuning::default());
        assert_eq!(sweeper.next(&shutdown), None);
        assert!(sweeper.is_done());
    }

    #[test]
    fn binary_phase_converges_within_step_budget() {
        let shutdown = AtomicBool::new(false);
        let mut sweeper = InferenceLoadSweeper::skip_to_binary(8, 16, SearchTuning::default());
        let mut steps = 0;
        while let Some(value) = sweeper.next(&shutdown) {
            steps += 1;
            sweeper.set_last_result(value, value < 12, None);
            assert!(steps <= 10, "binary phase should converge well within the step budget");
        }
        assert!(sweeper.is_done());
    }
}
