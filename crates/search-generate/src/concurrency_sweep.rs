use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;

use search_store::RunConfigMeasurement;

use crate::sweeper::InferenceLoadSweeper;
use crate::tuning::SearchTuning;

/// Shared post-search refinement stage used by Brute (phase 2) and,
/// unless disabled, by Quick and Optuna: binary-search the load boundary
/// around each of a queued set of top candidates via the Inference-Load
/// Sweeper. Generic over `T`, the caller's own representation of "which
/// candidate is being refined" (a parameter combo, a proposal map, ...).
pub struct ConcurrencySweepStage<T> {
    queue: VecDeque<(T, i64)>,
    tuning: SearchTuning,
    sweeper: Option<InferenceLoadSweeper>,
    current: Option<T>,
}

impl<T: Clone> ConcurrencySweepStage<T> {
    pub fn new(tuning: SearchTuning) -> Self {
        ConcurrencySweepStage {
            queue: VecDeque::new(),
            tuning,
            sweeper: None,
            current: None,
        }
    }

    /// Loads the top candidates to refine, each paired with the load value
    /// its best measurement was taken at.
    pub fn start(&mut self, candidates: Vec<(T, i64)>) {
        self.queue = candidates.into_iter().collect();
    }

    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty() && self.sweeper.is_none()
    }

    /// The next load value to measure for the in-progress candidate, and
    /// the candidate's own payload so the caller can build a full config.
    /// Returns `None` when the in-flight candidate's sweep finished; call
    /// again to advance to the next queued candidate.
    pub fn next(&mut self, shutdown: &AtomicBool) -> Option<(T, u64)> {
        if self.sweeper.is_none() {
            let (payload, base_load) = self.queue.pop_front()?;
            self.sweeper = Some(InferenceLoadSweeper::skip_to_binary(
                base_load.max(1) as u64,
                (base_load.max(1) * 2) as u64,
                self.tuning,
            ));
            self.current = Some(payload);
        }
        let sweeper = self.sweeper.as_mut().unwrap();
        match sweeper.next(shutdown) {
            Some(load) => Some((self.current.clone().unwrap(), load)),
            None => {
                self.sweeper = None;
                self.current = None;
                None
            }
        }
    }

    pub fn set_last_result(&mut self, value: u64, passes: bool, measurement: Option<RunConfigMeasurement>) {
        if let Some(sweeper) = self.sweeper.as_mut() {
            sweeper.set_last_result(value, passes, measurement);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_queue_one_candidate_at_a_time() {
        let mut stage: ConcurrencySweepStage<&'static str> = ConcurrencySweepStage::new(SearchTuning::default());
        stage.start(vec![("a", 8), ("b", 16)]);
        let shutdown = AtomicBool::new(false);

        // Drain the first candidate's binary phase, feeding back every value.
        loop {
            match stage.next(&shutdown) {
                Some((payload, load)) => {
                    assert_eq!(payload, "a");
                    stage.set_last_result(load, load < 12, None);
                }
                None => break,
            }
        }

        let (payload, _load) = stage.next(&shutdown).unwrap();
        assert_eq!(payload, "b");
    }
}
