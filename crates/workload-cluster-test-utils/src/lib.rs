//! Shared fixtures for workload-cluster tests.
//!
//! - [`series`]: Deterministic arrival-rate series generators
//! - [`traces`]: On-disk CSV trace directories in the loader's format

pub mod series;
pub mod traces;

pub use series::{
    base_timestamp, constant_series, minute, noisy_series, periodic_series, phased_series,
    DEFAULT_SEED,
};
pub use traces::{write_trace_dir, write_trace_file};
