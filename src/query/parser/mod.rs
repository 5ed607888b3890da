//! Parsers for descriptor text
//!
//! Calculation expressions reference other labels of the same row:
//!
//! ```rust
//! use kuba_rollup::query::parser::Expression;
//!
//! let expr = Expression::parse("(in + out) * 8").unwrap();
//! assert_eq!(expr.labels(), ["in", "out"]);
//! assert_eq!(expr.evaluate(&[1.0, 2.0]), 24.0);
//! ```
//!
//! Duration literals (`300s`, `5m`, `1h`) are parsed by
//! [`crate::time::Duration`]'s `FromStr` implementation.

pub mod expression;

pub use expression::{parse_expression, Expr, Expression};
