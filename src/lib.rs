//! Kuba Rollup - time-series resampling and consolidation
//!
//! This library turns irregular raw samples into fixed-interval series:
//! - Per-second rates for counters, with 32/64-bit wraparound handling
//! - Heartbeat-aware resampling into primary data points
//! - AVERAGE/MIN/MAX consolidation with an XFF validity rule
//! - Calculated series from closures or arithmetic expressions
//! - Fixed-shape export rows, unknown values as NaN

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod source;
pub mod time;
pub mod types;
pub mod value;

/// Configuration management with TOML support
pub mod config;

/// Subscriber setup for the `tracing` events the pipeline emits
pub mod logging;

/// Consolidation and calculation functions
pub mod aggregation;

/// Rollup query engine: descriptors, operators and the result processor
pub mod query;

// Re-export main types
pub use error::{Error, Result};
pub use query::{ResultDescriptor, ResultProcessor};
pub use time::{Duration, Timestamp};
pub use types::{Measurement, Resource, Results, Row, Sample};
pub use value::{MetricType, ValueType};
