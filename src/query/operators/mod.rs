//! Pipeline operators - pull-based row transforms
//!
//! Each stage of the rollup pipeline is an operator that produces exactly one
//! output row per pull and holds only a boxed handle to its upstream:
//!
//! - [`RowScan`] validates rows coming out of a sample source
//! - [`Rate`] turns accumulating samples into per-second rates
//! - [`PrimaryData`] resamples raw samples onto the primary interval
//! - [`Aggregation`] consolidates primary points into coarser buckets
//! - [`Compute`] appends calculated measurements
//! - [`Export`] projects rows onto the exported labels
//!
//! [`IntervalGenerator`] supplies the aligned timestamps the resampling
//! stages emit.

pub mod aggregation;
pub mod compute;
pub mod export;
pub mod interval;
pub mod primary;
pub mod rate;
pub mod scan;

pub use aggregation::Aggregation;
pub use compute::Compute;
pub use export::Export;
pub use interval::IntervalGenerator;
pub use primary::PrimaryData;
pub use rate::{CounterWrap, Rate};
pub use scan::RowScan;

use crate::query::error::QueryResult;
use crate::types::{Element, Results, Row};

// ============================================================================
// Operator Trait
// ============================================================================

/// Common interface for all pipeline operators
///
/// Operators implement a pull-based model where downstream operators
/// request rows from upstream operators.
pub trait RowOperator<T>: Send {
    /// Pull the next row
    ///
    /// Returns:
    /// - `Ok(Some(row))` - More data available
    /// - `Ok(None)` - No more data (end of stream)
    /// - `Err(e)` - Error occurred; the query should be abandoned
    fn next_row(&mut self) -> QueryResult<Option<Row<T>>>;

    /// Operator name for logging
    fn name(&self) -> &'static str;
}

impl<T, O> RowOperator<T> for Box<O>
where
    O: RowOperator<T> + ?Sized,
{
    fn next_row(&mut self) -> QueryResult<Option<Row<T>>> {
        (**self).next_row()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Owned upstream handle
pub type BoxedOperator<T> = Box<dyn RowOperator<T>>;

/// Iterator over an operator's rows
///
/// Yields each error once and then stops.
pub struct RowIter<T> {
    operator: BoxedOperator<T>,
    done: bool,
}

impl<T> RowIter<T> {
    /// Iterate over `operator`
    pub fn new(operator: BoxedOperator<T>) -> Self {
        Self {
            operator,
            done: false,
        }
    }
}

impl<T> Iterator for RowIter<T> {
    type Item = QueryResult<Row<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.operator.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Drain an operator into a result set
pub fn collect_rows<T: Element>(operator: &mut dyn RowOperator<T>) -> QueryResult<Results<T>> {
    let mut results = Results::new();
    while let Some(row) = operator.next_row()? {
        results.push(row);
    }
    Ok(results)
}

// ============================================================================
// Test Utilities
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    //! Row builders shared by the operator tests

    use std::collections::VecDeque;

    use super::*;
    use crate::time::Timestamp;
    use crate::types::{Attributes, Measurement, Resource, Sample};
    use crate::value::ValueType;

    /// Operator replaying prepared rows
    pub struct MockOperator<T> {
        rows: VecDeque<Row<T>>,
    }

    impl<T> MockOperator<T> {
        pub fn new(rows: Vec<Row<T>>) -> Self {
            Self { rows: rows.into() }
        }

        pub fn boxed(rows: Vec<Row<T>>) -> BoxedOperator<T>
        where
            T: Send + 'static,
        {
            Box::new(Self::new(rows))
        }
    }

    impl<T: Send> RowOperator<T> for MockOperator<T> {
        fn next_row(&mut self) -> QueryResult<Option<Row<T>>> {
            Ok(self.rows.pop_front())
        }

        fn name(&self) -> &'static str {
            "Mock"
        }
    }

    pub fn resource() -> Resource {
        Resource::new("localhost")
    }

    pub fn ts(seconds: i64) -> Timestamp {
        Timestamp::from_epoch_seconds(seconds)
    }

    pub fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Builder for sample rows
    pub struct SampleRows {
        rows: Vec<Row<Sample>>,
    }

    impl SampleRows {
        pub fn new() -> Self {
            Self { rows: Vec::new() }
        }

        pub fn row(mut self, seconds: i64) -> Self {
            self.rows.push(Row::new(ts(seconds), resource()));
            self
        }

        pub fn element(self, name: &str, value: ValueType) -> Self {
            self.element_with(name, value, None)
        }

        pub fn element_with(
            mut self,
            name: &str,
            value: ValueType,
            attributes: Option<Attributes>,
        ) -> Self {
            if let Some(row) = self.rows.last_mut() {
                let mut sample = Sample::new(row.timestamp(), resource(), name, value);
                if let Some(attributes) = attributes {
                    sample = sample.with_attributes(attributes);
                }
                row.add_element(sample);
            }
            self
        }

        pub fn gauge(self, name: &str, value: f64) -> Self {
            self.element(name, ValueType::Gauge(value))
        }

        pub fn build(self) -> Vec<Row<Sample>> {
            self.rows
        }
    }

    /// Measurement rows
    pub struct MeasurementRows {
        rows: Vec<Row<Measurement>>,
    }

    impl MeasurementRows {
        pub fn new() -> Self {
            Self { rows: Vec::new() }
        }

        pub fn row(mut self, seconds: i64) -> Self {
            self.rows.push(Row::new(ts(seconds), resource()));
            self
        }

        pub fn element(self, name: &str, value: f64) -> Self {
            self.element_with(name, value, None)
        }

        pub fn element_with(mut self, name: &str, value: f64, attributes: Option<Attributes>) -> Self {
            if let Some(row) = self.rows.last_mut() {
                row.add_element(Measurement::new(
                    row.timestamp(),
                    resource(),
                    name,
                    value,
                    attributes,
                ));
            }
            self
        }

        pub fn build(self) -> Vec<Row<Measurement>> {
            self.rows
        }
    }

    /// Assert a measurement value, treating NaN as equal to NaN
    pub fn assert_value(row: &Row<Measurement>, label: &str, expected: f64) {
        let actual = row
            .element(label)
            .unwrap_or_else(|| panic!("missing '{}' at {}", label, row.timestamp()))
            .value();
        if expected.is_nan() {
            assert!(actual.is_nan(), "{} at {}: expected NaN, got {}", label, row.timestamp(), actual);
        } else {
            assert!(
                (actual - expected).abs() < 1e-6,
                "{} at {}: expected {}, got {}",
                label,
                row.timestamp(),
                expected,
                actual
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::query::error::QueryError;
    use crate::types::Measurement;

    struct Failing;

    impl RowOperator<Measurement> for Failing {
        fn next_row(&mut self) -> QueryResult<Option<Row<Measurement>>> {
            Err(QueryError::internal("boom"))
        }

        fn name(&self) -> &'static str {
            "Failing"
        }
    }

    #[test]
    fn test_collect_rows() {
        let rows = MeasurementRows::new().row(1).element("a", 1.0).row(2).build();
        let mut op = MockOperator::new(rows);
        let results = collect_rows::<Measurement>(&mut op).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_row_iter_stops_after_error() {
        let mut iter = RowIter::<Measurement>::new(Box::new(Failing));
        assert!(matches!(iter.next(), Some(Err(_))));
        assert!(iter.next().is_none());
    }
}
