//! Reduction functions used by the consolidation and compute stages
//!
//! ```text
//!   primary data points ──► ConsolidationFunction ──► consolidated value
//!   row measurements    ──► CalculationFunction   ──► calculated value
//! ```

pub mod functions;

pub use functions::{CalculationFunction, ConsolidationFunction};
