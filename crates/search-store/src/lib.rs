//! Model/run config measurements and the checkpointable result store.
//!
//! [`ModelConfigMeasurement`] holds one model variant's non-GPU metrics;
//! [`RunConfigMeasurement`] combines one or more of those (plus averaged
//! GPU metrics) into the unit the generators compare and rank.
//! [`ResultStore`] is the sorted, deduped, checkpointable container that
//! holds every measured run for the lifetime of a profiling session.

#![forbid(unsafe_code)]

mod mcm;
mod rcm;
mod store;

pub use mcm::ModelConfigMeasurement;
pub use rcm::RunConfigMeasurement;
pub use store::{ResultStore, RunConfig};
