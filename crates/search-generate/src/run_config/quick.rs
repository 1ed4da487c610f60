use std::collections::HashMap;
use std::sync::atomic::AtomicBool;

use indexmap::IndexMap;

use search_store::RunConfigMeasurement;

use super::RunConfigGenerator;
use crate::candidate::{ModelVariantCandidate, RunConfigCandidate};
use crate::tuning::SearchTuning;

/// One dimension of the coordinate lattice: which model it belongs to,
/// its exposed name, and how its integer index maps to a config value.
#[derive(Debug, Clone)]
pub struct QuickDimension {
    pub model_name: String,
    pub param_name: String,
    pub min_idx: i64,
    pub max_idx: i64,
    pub exponential: bool,
}

impl QuickDimension {
    fn realize(&self, idx: i64) -> i64 {
        if self.exponential {
            1i64 << idx
        } else {
            idx + 1
        }
    }
}

type Coordinate = Vec<i64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    InitializeNeighborhood,
    Step,
    StepBack,
    Done,
}

struct NeighborState {
    coord: Coordinate,
    measurement: Option<f64>,
    passes: bool,
}

/// Coordinate-descent hill climb over the lattice formed by every
/// non-ensemble model's dimensions. Slow mode (forced after a step-back)
/// clamps the neighborhood radius to 1 for the remainder of the search.
pub struct QuickRunConfigGenerator {
    dims: Vec<QuickDimension>,
    tuning: SearchTuning,
    home: Coordinate,
    home_passed_once: bool,
    visit_counts: HashMap<Coordinate, u32>,
    neighborhood: Vec<NeighborState>,
    neighbor_cursor: usize,
    state: State,
    slow_mode: bool,
    best_seen: Option<(Coordinate, f64)>,
    pending_coord: Option<Coordinate>,
    home_score: Option<f64>,
}

impl QuickRunConfigGenerator {
    pub fn new(dims: Vec<QuickDimension>, tuning: SearchTuning) -> Self {
        let home: Coordinate = dims.iter().map(|d| d.min_idx).collect();
        QuickRunConfigGenerator {
            dims,
            tuning,
            home,
            home_passed_once: false,
            visit_counts: HashMap::new(),
            neighborhood: Vec::new(),
            neighbor_cursor: 0,
            state: State::Init,
            slow_mode: false,
            best_seen: None,
            pending_coord: None,
            home_score: None,
        }
    }

    fn radius(&self) -> i64 {
        if self.slow_mode {
            1
        } else {
            self.tuning.radius
        }
    }

    fn build_neighborhood(&mut self) {
        let radius = self.radius();
        let mut points = Vec::new();
        Self::enumerate(&self.dims, &self.home, 0, radius, &mut Vec::new(), &mut points);
        self.neighborhood = points
            .into_iter()
            .filter(|p| p != &self.home)
            .map(|coord| NeighborState {
                coord,
                measurement: None,
                passes: false,
            })
            .collect();
        self.neighbor_cursor = 0;
    }

    fn enumerate(
        dims: &[QuickDimension],
        home: &Coordinate,
        axis: usize,
        radius: i64,
        current: &mut Coordinate,
        out: &mut Vec<Coordinate>,
    ) {
        if axis == dims.len() {
            out.push(current.clone());
            return;
        }
        let dim = &dims[axis];
        let lo = (home[axis] - radius).max(dim.min_idx);
        let hi = (home[axis] + radius).min(dim.max_idx);
        for v in lo..=hi {
            current.push(v);
            Self::enumerate(dims, home, axis + 1, radius, current, out);
            current.pop();
        }
    }

    fn config_for(&self, coord: &Coordinate) -> RunConfigCandidate {
        let mut by_model: IndexMap<String, HashMap<String, i64>> = IndexMap::new();
        for (dim, idx) in self.dims.iter().zip(coord.iter()) {
            by_model
                .entry(dim.model_name.clone())
                .or_default()
                .insert(dim.param_name.clone(), dim.realize(*idx));
        }
        let models = by_model
            .into_iter()
            .map(|(model_name, perf_params)| {
                ModelVariantCandidate::new(model_name, serde_json::Value::Object(serde_json::Map::new()), perf_params)
            })
            .collect();
        RunConfigCandidate::new(models)
    }

    /// The best neighbor that strictly improves on home's own score, if
    /// any. A neighbor merely tying home does not count as an improvement,
    /// which guarantees the walk can't cycle between equally-scored
    /// coordinates forever.
    fn best_improving_neighbor(&self) -> Option<&NeighborState> {
        let home_score = self.home_score.unwrap_or(f64::NEG_INFINITY);
        self.neighborhood
            .iter()
            .filter(|n| n.passes && n.measurement.unwrap_or(f64::NEG_INFINITY) > home_score)
            .max_by(|a, b| {
                a.measurement
                    .unwrap_or(f64::NEG_INFINITY)
                    .partial_cmp(&b.measurement.unwrap_or(f64::NEG_INFINITY))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

impl RunConfigGenerator for QuickRunConfigGenerator {
    fn next_config(&mut self, shutdown: &AtomicBool) -> Option<RunConfigCandidate> {
        if shutdown.load(std::sync::atomic::Ordering::Relaxed) {
            self.state = State::Done;
            return None;
        }

        match self.state {
            State::Init => {
                self.pending_coord = Some(self.home.clone());
                self.state = State::InitializeNeighborhood;
                Some(self.config_for(&self.home))
            }
            State::InitializeNeighborhood => {
                if self.neighborhood.is_empty() && self.neighbor_cursor == 0 {
                    self.build_neighborhood();
                }
                if self.neighbor_cursor >= self.tuning.min_initialized.min(self.neighborhood.len()) {
                    self.state = State::Step;
                    return self.next_config(shutdown);
                }
                let coord = self.neighborhood[self.neighbor_cursor].coord.clone();
                self.pending_coord = Some(coord.clone());
                Some(self.config_for(&coord))
            }
            State::Step | State::StepBack => {
                let best = self
                    .best_improving_neighbor()
                    .map(|n| (n.coord.clone(), n.measurement.unwrap_or(0.0)));
                match best {
                    None => {
                        self.state = State::Done;
                        None
                    }
                    Some((coord, _)) => {
                        self.home = coord.clone();
                        self.pending_coord = Some(coord.clone());
                        *self.visit_counts.entry(coord.clone()).or_insert(0) += 1;
                        self.state = State::InitializeNeighborhood;
                        self.neighborhood.clear();
                        self.neighbor_cursor = 0;
                        Some(self.config_for(&coord))
                    }
                }
            }
            State::Done => None,
        }
    }

    fn set_last_result(&mut self, measurement: Option<RunConfigMeasurement>, passes: bool) {
        let coord = match self.pending_coord.take() {
            Some(c) => c,
            None => return,
        };
        let value = measurement
            .as_ref()
            .and_then(|m| m.model_config_measurements().first())
            .map(|mcm| mcm.get_metric_value("perf_throughput", 0.0));

        if let Some(v) = value {
            if passes {
                if self.best_seen.as_ref().map_or(true, |(_, best)| v > *best) {
                    self.best_seen = Some((coord.clone(), v));
                }
            }
        }

        if coord == self.home {
            let visits = *self.visit_counts.get(&coord).unwrap_or(&0);
            let sticky_violation = self.home_passed_once && !passes;
            if passes {
                self.home_passed_once = true;
                self.home_score = value;
            }
            if sticky_violation || visits >= 2 {
                if let Some((best_coord, _)) = self.best_seen.clone() {
                    self.home = best_coord;
                }
                self.slow_mode = true;
                self.neighborhood.clear();
                self.neighbor_cursor = 0;
                self.state = State::InitializeNeighborhood;
                return;
            }
        }

        if let Some(neighbor) = self.neighborhood.iter_mut().find(|n| n.coord == coord) {
            neighbor.measurement = value;
            neighbor.passes = passes;
            self.neighbor_cursor += 1;
        }
    }
}
