//! Consolidation and calculation functions
//!
//! - [`ConsolidationFunction`]: reduces the primary data points of one
//!   consolidation bucket to a single value (AVERAGE, MIN, MAX)
//! - [`CalculationFunction`]: n-ary function over the measurements of one row,
//!   used by calculated datasources
//!
//! Consolidation functions assume the XFF test has already been applied by the
//! caller; they simply skip NaN inputs.
//!
//! # Example
//!
//! ```rust
//! use kuba_rollup::aggregation::functions::ConsolidationFunction;
//!
//! let values = [1.0, f64::NAN, 3.0];
//! assert_eq!(ConsolidationFunction::Average.apply(&values), 2.0);
//! assert_eq!(ConsolidationFunction::Max.apply(&values), 3.0);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;

// ============================================================================
// Consolidation
// ============================================================================

/// Reduction applied across the primary data points of a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsolidationFunction {
    /// Mean of the known values
    Average,
    /// Smallest known value
    Min,
    /// Largest known value
    Max,
}

impl ConsolidationFunction {
    /// Reduce `values`, ignoring NaN entries
    ///
    /// An empty slice is NaN for every function. When every entry is NaN,
    /// AVERAGE is NaN while MIN and MAX return their starting sentinels
    /// (`f64::MAX` and `f64::MIN`).
    pub fn apply(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }

        let known = values.iter().copied().filter(|v| !v.is_nan());
        match self {
            ConsolidationFunction::Average => {
                let (sum, count) = known.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
                if count == 0 {
                    f64::NAN
                } else {
                    sum / count as f64
                }
            }
            ConsolidationFunction::Min => known.fold(f64::MAX, f64::min),
            ConsolidationFunction::Max => known.fold(f64::MIN, f64::max),
        }
    }

    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsolidationFunction::Average => "AVERAGE",
            ConsolidationFunction::Min => "MIN",
            ConsolidationFunction::Max => "MAX",
        }
    }
}

impl fmt::Display for ConsolidationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsolidationFunction {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AVERAGE" | "AVG" => Ok(ConsolidationFunction::Average),
            "MIN" | "MINIMUM" => Ok(ConsolidationFunction::Min),
            "MAX" | "MAXIMUM" => Ok(ConsolidationFunction::Max),
            _ => Err(DescriptorError::UnknownFunction(s.to_string())),
        }
    }
}

// ============================================================================
// Calculations
// ============================================================================

/// Function computing a derived value from the values of other labels
///
/// Implemented for every `Fn(&[f64]) -> f64`, so closures and the helpers
/// below can be used directly.
pub trait CalculationFunction: Send + Sync {
    /// Evaluate over the argument values, in argument order
    fn apply(&self, args: &[f64]) -> f64;
}

impl<F> CalculationFunction for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn apply(&self, args: &[f64]) -> f64 {
        self(args)
    }
}

/// Sum of all arguments
pub fn sum(args: &[f64]) -> f64 {
    args.iter().sum()
}

/// Product of all arguments
pub fn product(args: &[f64]) -> f64 {
    args.iter().product()
}

/// First argument minus every following argument
pub fn difference(args: &[f64]) -> f64 {
    match args.split_first() {
        Some((first, rest)) => rest.iter().fold(*first, |acc, v| acc - v),
        None => f64::NAN,
    }
}

/// First argument divided by every following argument
pub fn quotient(args: &[f64]) -> f64 {
    match args.split_first() {
        Some((first, rest)) => rest.iter().fold(*first, |acc, v| acc / v),
        None => f64::NAN,
    }
}
