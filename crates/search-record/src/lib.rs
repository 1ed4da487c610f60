//! Typed metric records and the measurement aggregator.
//!
//! A [`Record`] is a single named metric observation (throughput, latency,
//! GPU memory, ...). Every tag has a process-wide, fixed [`Polarity`] that
//! governs comparison and the sign of subtraction. [`Aggregator`] buckets
//! raw records returned by the measurement harness by tag (and, for GPU
//! records, by device) and reduces each bucket to a single record.

#![forbid(unsafe_code)]

mod aggregator;
mod record;
pub mod registry;

pub use aggregator::{AggregatedMeasurement, Aggregator};
pub use record::{Polarity, Record};
