//! Error types for the rollup pipeline

use thiserror::Error;

use crate::query::error::QueryError;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Result descriptor rejected
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Query execution failed
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Sample source failed
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Problems found while building a result descriptor or query
///
/// All of these are raised before the first row is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    /// Label used twice across datasources and calculations
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),

    /// Calculation input or export that names nothing defined before it
    #[error("Unknown label '{label}' referenced by {referrer}")]
    UnknownLabel {
        /// The missing label
        label: String,
        /// Calculation label, or "export"
        referrer: String,
    },

    /// Calculation without inputs
    #[error("Calculation '{0}' has no arguments")]
    NoArguments(String),

    /// Heartbeat shorter than the primary interval
    #[error("Heartbeat {heartbeat} of '{label}' is shorter than step {step}")]
    HeartbeatTooShort {
        /// Datasource label
        label: String,
        /// Configured heartbeat
        heartbeat: String,
        /// Descriptor step
        step: String,
    },

    /// XFF outside [0, 1]
    #[error("XFF {xff} of '{label}' must be within [0, 1]")]
    InvalidXff {
        /// Datasource label
        label: String,
        /// Configured XFF
        xff: f64,
    },

    /// Zero-length step
    #[error("Step must be greater than zero")]
    ZeroStep,

    /// Resolution is not a whole multiple of the step
    #[error("Resolution {resolution} is not a multiple of step {step}")]
    ResolutionNotMultiple {
        /// Requested resolution
        resolution: String,
        /// Descriptor step
        step: String,
    },

    /// Query range ends before it starts
    #[error("Query end {end} precedes start {start}")]
    InvertedRange {
        /// Query start
        start: String,
        /// Query end
        end: String,
    },

    /// Calculation expression failed to parse
    #[error("Invalid expression for '{label}': {reason}")]
    InvalidExpression {
        /// Calculation label
        label: String,
        /// Parser message
        reason: String,
    },

    /// Unknown consolidation function name
    #[error("Unknown consolidation function: {0}")]
    UnknownFunction(String),

    /// Malformed duration literal
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Named descriptor absent from configuration
    #[error("Descriptor not found: {0}")]
    NotFound(String),
}

/// Failures reported by a sample source
#[derive(Error, Debug)]
pub enum SourceError {
    /// Source cannot serve reads
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be decoded
    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_error_display() {
        let err = DescriptorError::UnknownLabel {
            label: "m9".to_string(),
            referrer: "total".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown label 'm9' referenced by total");
    }

    #[test]
    fn test_error_from_descriptor() {
        let err: Error = DescriptorError::ZeroStep.into();
        assert!(matches!(err, Error::Descriptor(DescriptorError::ZeroStep)));
        assert!(err.to_string().starts_with("Descriptor error"));
    }
}
