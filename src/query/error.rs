//! Query error types
//!
//! Structured errors for pipeline assembly and execution. Exhaustion of a
//! stage is not an error: operators report it as `Ok(None)`.

use std::fmt;

use crate::error::{DescriptorError, SourceError};

/// Query error with context
#[derive(Debug)]
pub struct QueryError {
    /// Error kind for programmatic handling
    pub kind: QueryErrorKind,
    /// Human-readable message
    pub message: String,
    /// Optional source error
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl QueryError {
    /// Create a new query error
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add source error for error chaining
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Configuration, message)
    }

    /// Create an upstream-consistency error
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Consistency, message)
    }

    /// Create a sample source error
    pub fn source_failure(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Source, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Internal, message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<DescriptorError> for QueryError {
    fn from(err: DescriptorError) -> Self {
        QueryError::configuration(err.to_string()).with_source(err)
    }
}

impl From<SourceError> for QueryError {
    fn from(err: SourceError) -> Self {
        QueryError::source_failure(err.to_string()).with_source(err)
    }
}

/// Categories of query errors for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Descriptor or query parameters rejected before any row was produced
    Configuration,
    /// Input violated a pipeline invariant (ordering, missing label, wrong resource)
    Consistency,
    /// The sample source failed
    Source,
    /// Internal error (bug, unexpected state)
    Internal,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryErrorKind::Configuration => write!(f, "ConfigurationError"),
            QueryErrorKind::Consistency => write!(f, "ConsistencyError"),
            QueryErrorKind::Source => write!(f, "SourceError"),
            QueryErrorKind::Internal => write!(f, "Internal"),
        }
    }
}

/// Result type alias for query operations
pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = QueryError::consistency("missing measurement 'm0'");
        assert_eq!(err.kind, QueryErrorKind::Consistency);
        assert!(err.message.contains("m0"));
    }

    #[test]
    fn test_error_display() {
        let err = QueryError::configuration("resolution 7s is not a multiple of step 5s");
        let display = format!("{}", err);
        assert!(display.contains("ConfigurationError"));
        assert!(display.contains("7s"));
    }

    #[test]
    fn test_from_descriptor_error_keeps_source() {
        use std::error::Error;
        let err: QueryError = DescriptorError::ZeroStep.into();
        assert_eq!(err.kind, QueryErrorKind::Configuration);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_with_source() {
        use std::error::Error;
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: QueryError = SourceError::Io(io_err).into();
        assert_eq!(err.kind, QueryErrorKind::Source);
        assert!(err.source().is_some());
    }
}
