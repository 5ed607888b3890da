//! Rollup query engine
//!
//! Turns raw samples of one resource into fixed-resolution rows of
//! measurements, in the style of RRD primary and consolidated data points.
//!
//! # Architecture
//!
//! ```text
//! ResultDescriptor            QueryParams
//!  (step, datasources,         (resource, start, end,
//!   calculations, exports)      resolution)
//!        │                          │
//!        └────────────┬─────────────┘
//!                     ▼
//!             ┌───────────────┐
//!             │ResultProcessor│  Validates, assembles operators
//!             └───────────────┘
//!                     │
//!                     ▼
//!  RowScan → Rate → PrimaryData → Aggregation → Compute → Export
//! ```
//!
//! Every stage is a pull-based [`RowOperator`](operators::RowOperator) that
//! returns one row per call, so memory stays constant in the length of the
//! time range.
//!
//! # Example
//!
//! ```rust
//! use kuba_rollup::aggregation::ConsolidationFunction;
//! use kuba_rollup::query::ResultDescriptor;
//! use kuba_rollup::time::Duration;
//!
//! let descriptor = ResultDescriptor::builder()
//!     .step(Duration::seconds(300))
//!     .datasource("in", "ifInOctets", ConsolidationFunction::Average)
//!     .datasource("out", "ifOutOctets", ConsolidationFunction::Average)
//!     .expression("total", "in + out")
//!     .export(["in", "out", "total"])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(descriptor.source_names(), &["ifInOctets".to_string(), "ifOutOctets".to_string()]);
//! ```

pub mod descriptor;
pub mod error;
pub mod executor;
pub mod operators;
pub mod parser;

// Re-export main types
pub use descriptor::{Calculation, Datasource, Operand, ResultDescriptor, ResultDescriptorBuilder};
pub use error::{QueryError, QueryErrorKind, QueryResult};
pub use executor::{QueryParams, ResultProcessor};
pub use operators::{
    collect_rows, Aggregation, BoxedOperator, Compute, CounterWrap, Export, IntervalGenerator,
    PrimaryData, Rate, RowIter, RowOperator, RowScan,
};
pub use parser::{Expr, Expression};
