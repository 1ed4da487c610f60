//! Shared error type for the model-config search engine.

#![forbid(unsafe_code)]

mod error;

pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Floating-point tolerance around zero used wherever a comparator needs
/// to decide "effectively tied" rather than picking a side on noise.
pub const EPSILON: f64 = 1e-9;
