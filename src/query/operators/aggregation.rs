//! Aggregation Operator - consolidation into resolution buckets
//!
//! Groups primary data points into buckets of `resolution` and reduces each
//! datasource with its consolidation function. A bucket ending at `c` holds
//! the points in `(c - resolution, c]`. Buckets without enough known points,
//! as judged by the datasource XFF, are NaN.

use std::sync::Arc;

use tracing::trace;

use crate::error::DescriptorError;
use crate::query::descriptor::{Datasource, ResultDescriptor};
use crate::query::error::QueryResult;
use crate::query::operators::{BoxedOperator, IntervalGenerator, RowOperator};
use crate::time::{Duration, Timestamp};
use crate::types::{merge_attributes, Attributes, Element, Measurement, Resource, Row};

/// Consolidation stage
pub struct Aggregation {
    input: BoxedOperator<Measurement>,
    descriptor: Arc<ResultDescriptor>,
    resource: Resource,
    resolution: Duration,
    intervals_per_bucket: f64,
    timestamps: IntervalGenerator,
    pending: Option<Row<Measurement>>,
    input_exhausted: bool,
    primed: bool,
    /// Per datasource, reused across buckets
    values: Vec<Vec<f64>>,
    attributes: Vec<Option<Attributes>>,
}

impl Aggregation {
    /// Consolidate `input` into `resolution` buckets over `[start, end]`
    ///
    /// Fails when `resolution` is not a whole multiple of the descriptor step.
    pub fn new(
        input: BoxedOperator<Measurement>,
        resource: Resource,
        start: Timestamp,
        end: Timestamp,
        descriptor: Arc<ResultDescriptor>,
        resolution: Duration,
    ) -> QueryResult<Self> {
        let step = descriptor.step();
        if !resolution.is_multiple_of(step) {
            return Err(DescriptorError::ResolutionNotMultiple {
                resolution: resolution.to_string(),
                step: step.to_string(),
            }
            .into());
        }

        let timestamps = IntervalGenerator::new(
            start.step_floor(resolution),
            end.step_ceiling(resolution),
            resolution,
        );
        let count = descriptor.datasources().len();

        Ok(Self {
            input,
            intervals_per_bucket: resolution.divide_by(step),
            descriptor,
            resource,
            resolution,
            timestamps,
            pending: None,
            input_exhausted: false,
            primed: false,
            values: vec![Vec::new(); count],
            attributes: vec![None; count],
        })
    }

    /// Next upstream row at or before `ceiling`
    fn next_input_until(&mut self, ceiling: Timestamp) -> QueryResult<Option<Row<Measurement>>> {
        if self.pending.is_none() && !self.input_exhausted {
            self.pending = self.input.next_row()?;
            self.input_exhausted = self.pending.is_none();
        }
        match &self.pending {
            Some(row) if row.timestamp() <= ceiling => Ok(self.pending.take()),
            _ => Ok(None),
        }
    }

    fn consolidate(&self, datasource: &Datasource, values: &[f64]) -> f64 {
        let valid = values.iter().filter(|v| !v.is_nan()).count() as f64;
        if valid / self.intervals_per_bucket > datasource.xff() {
            datasource.function().apply(values)
        } else {
            f64::NAN
        }
    }
}

impl RowOperator<Measurement> for Aggregation {
    fn next_row(&mut self) -> QueryResult<Option<Row<Measurement>>> {
        let Some(ceiling) = self.timestamps.next() else {
            return Ok(None);
        };

        if !self.primed {
            let before = ceiling.minus(self.resolution);
            while self.next_input_until(before)?.is_some() {}
            self.primed = true;
        }

        let descriptor = Arc::clone(&self.descriptor);
        let datasources = descriptor.datasources();
        for values in &mut self.values {
            values.clear();
        }

        let mut points = 0usize;
        while let Some(row) = self.next_input_until(ceiling)? {
            points += 1;
            for (index, datasource) in datasources.iter().enumerate() {
                match row.element(datasource.label()) {
                    Some(measurement) => {
                        self.values[index].push(measurement.value());
                        merge_attributes(&mut self.attributes[index], measurement.attributes());
                    }
                    None => self.values[index].push(f64::NAN),
                }
            }
        }

        let mut output = Row::with_capacity(ceiling, self.resource.clone(), datasources.len());
        for (index, datasource) in datasources.iter().enumerate() {
            let value = self.consolidate(datasource, &self.values[index]);
            output.add_element(Measurement::new(
                ceiling,
                self.resource.clone(),
                datasource.label(),
                value,
                self.attributes[index].take(),
            ));
        }

        trace!(
            resource = %self.resource,
            timestamp = %ceiling,
            points,
            "Consolidated data point"
        );

        Ok(Some(output))
    }

    fn name(&self) -> &'static str {
        "Aggregation"
    }
}
