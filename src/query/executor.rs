//! Result Processor - assembles and runs the rollup pipeline
//!
//! One processor answers one query: a resource, a time range and an output
//! resolution, shaped by a [`ResultDescriptor`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │     Export      │  ← Fixed-shape rows of exported labels
//! └────────┬────────┘
//!          │ pull rows
//! ┌────────▼────────┐
//! │     Compute     │  ← Calculated measurements
//! └────────┬────────┘
//!          │ pull rows
//! ┌────────▼────────┐
//! │   Aggregation   │  ← resolution buckets over [start, end]
//! └────────┬────────┘
//!          │ pull rows
//! ┌────────▼────────┐
//! │   PrimaryData   │  ← step buckets over [start - resolution, end]
//! └────────┬────────┘
//!          │ pull rows
//! ┌────────▼────────┐
//! │      Rate       │  ← Counters to per-second gauges
//! └────────┬────────┘
//!          │ pull rows
//! ┌────────▼────────┐
//! │     RowScan     │  ← Sample source, ordering checks
//! └─────────────────┘
//! ```
//!
//! Primary data starts one resolution early so the first consolidated bucket
//! is fully covered.
//!
//! # Example
//!
//! ```rust
//! use kuba_rollup::aggregation::ConsolidationFunction;
//! use kuba_rollup::query::{ResultDescriptor, ResultProcessor};
//! use kuba_rollup::source::InMemorySampleSource;
//! use kuba_rollup::time::{Duration, Timestamp};
//! use kuba_rollup::types::{Resource, Sample};
//! use kuba_rollup::value::ValueType;
//!
//! let resource = Resource::new("localhost");
//! let source = InMemorySampleSource::new();
//! for i in 0..=24 {
//!     let ts = Timestamp::from_epoch_seconds(900_000_000 + i * 300);
//!     source.insert(Sample::new(ts, resource.clone(), "load", ValueType::Gauge(1.0)));
//! }
//!
//! let descriptor = ResultDescriptor::builder()
//!     .step(Duration::seconds(300))
//!     .datasource("load", "load", ConsolidationFunction::Average)
//!     .export(["load"])
//!     .build()
//!     .unwrap();
//!
//! let processor = ResultProcessor::new(
//!     resource,
//!     Timestamp::from_epoch_seconds(900_003_600),
//!     Timestamp::from_epoch_seconds(900_007_200),
//!     descriptor,
//!     Duration::hours(1),
//! )
//! .unwrap();
//!
//! let results = processor.select(&source).unwrap();
//! assert_eq!(results.len(), 2);
//! ```

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::DescriptorError;
use crate::query::descriptor::ResultDescriptor;
use crate::query::error::QueryResult;
use crate::query::operators::{
    collect_rows, Aggregation, BoxedOperator, Compute, CounterWrap, Export, PrimaryData, Rate,
    RowOperator, RowScan,
};
use crate::source::SampleSource;
use crate::time::{Duration, Timestamp};
use crate::types::{Measurement, Resource, Results, Sample};

// ============================================================================
// Query Parameters
// ============================================================================

/// What a single query asks for
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    /// Resource whose samples are read
    pub resource: Resource,
    /// First consolidated timestamp (rounded down to the resolution)
    pub start: Timestamp,
    /// Last consolidated timestamp (rounded up to the resolution)
    pub end: Timestamp,
    /// Spacing of output rows
    pub resolution: Duration,
}

impl QueryParams {
    /// Start of the primary data range
    pub fn primary_start(&self) -> Timestamp {
        self.start.minus(self.resolution)
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Builds the operator chain for one query
#[derive(Debug, Clone)]
pub struct ResultProcessor {
    params: QueryParams,
    descriptor: Arc<ResultDescriptor>,
    counter_wrap: CounterWrap,
}

impl ResultProcessor {
    /// Validate the query against `descriptor`
    ///
    /// Fails with a configuration error when `start` is after `end` or when
    /// `resolution` is not a whole multiple of the descriptor step.
    pub fn new(
        resource: Resource,
        start: Timestamp,
        end: Timestamp,
        descriptor: impl Into<Arc<ResultDescriptor>>,
        resolution: Duration,
    ) -> QueryResult<Self> {
        let descriptor = descriptor.into();

        if start > end {
            return Err(DescriptorError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            }
            .into());
        }
        if !resolution.is_multiple_of(descriptor.step()) {
            return Err(DescriptorError::ResolutionNotMultiple {
                resolution: resolution.to_string(),
                step: descriptor.step().to_string(),
            }
            .into());
        }

        Ok(Self {
            params: QueryParams {
                resource,
                start,
                end,
                resolution,
            },
            descriptor,
            counter_wrap: CounterWrap::default(),
        })
    }

    /// Set the counter wrap policy
    pub fn with_counter_wrap(mut self, counter_wrap: CounterWrap) -> Self {
        self.counter_wrap = counter_wrap;
        self
    }

    /// Query parameters
    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Shared descriptor
    pub fn descriptor(&self) -> &Arc<ResultDescriptor> {
        &self.descriptor
    }

    /// Lazy operator chain over `samples`
    ///
    /// `samples` must be rows of the query's resource in ascending order.
    pub fn pipeline(
        &self,
        samples: BoxedOperator<Sample>,
    ) -> QueryResult<BoxedOperator<Measurement>> {
        let QueryParams {
            resource,
            start,
            end,
            resolution,
        } = &self.params;

        let rate = Rate::new(samples, self.descriptor.source_names().to_vec())
            .with_counter_wrap(self.counter_wrap);
        let primary = PrimaryData::new(
            Box::new(rate),
            resource.clone(),
            self.params.primary_start(),
            *end,
            Arc::clone(&self.descriptor),
        );
        let aggregation = Aggregation::new(
            Box::new(primary),
            resource.clone(),
            *start,
            *end,
            Arc::clone(&self.descriptor),
            *resolution,
        )?;
        let compute = Compute::new(Box::new(aggregation), Arc::clone(&self.descriptor));
        let export = Export::new(Box::new(compute), self.descriptor.exports().to_vec());

        Ok(Box::new(export))
    }

    /// Run the pipeline over `samples` and collect every row
    pub fn process(&self, samples: BoxedOperator<Sample>) -> QueryResult<Results<Measurement>> {
        let started = Instant::now();
        debug!(
            resource = %self.params.resource,
            start = %self.params.start,
            end = %self.params.end,
            resolution = %self.params.resolution,
            "Processing query"
        );

        let mut pipeline = self.pipeline(samples)?;
        let results = collect_rows::<Measurement>(pipeline.as_mut())?;

        debug!(
            resource = %self.params.resource,
            operator = pipeline.name(),
            rows = results.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Query complete"
        );
        Ok(results)
    }

    /// Read the samples the query needs from `source` and process them
    pub fn select<S>(&self, source: &S) -> QueryResult<Results<Measurement>>
    where
        S: SampleSource + ?Sized,
    {
        let stream = source.select(
            &self.params.resource,
            self.params.primary_start(),
            self.params.end,
        )?;
        let scan = RowScan::new(self.params.resource.clone(), stream);
        self.process(Box::new(scan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::functions::sum;
    use crate::aggregation::ConsolidationFunction;
    use crate::query::error::QueryErrorKind;
    use crate::query::operators::testing::*;
    use crate::types::Row;
    use crate::value::{MetricType, ValueType};

    const HOUR_START: i64 = 900_003_600;
    const HOUR_END: i64 = 900_007_200;

    /// 25 rows every 300s from 900000000, `value(i)` for row `i`
    fn two_hours<F>(metrics: &[&str], metric_type: MetricType, value: F) -> Vec<Row<Sample>>
    where
        F: Fn(i64) -> f64,
    {
        let mut rows = SampleRows::new();
        for i in 0..=24 {
            rows = rows.row(900_000_000 + i * 300);
            for metric in metrics {
                rows = rows.element(metric, ValueType::compose(value(i), metric_type));
            }
        }
        rows.build()
    }

    fn processor(descriptor: ResultDescriptor) -> ResultProcessor {
        ResultProcessor::new(
            resource(),
            ts(HOUR_START),
            ts(HOUR_END),
            descriptor,
            Duration::minutes(60),
        )
        .unwrap()
    }

    fn assert_hourly(results: &Results<Measurement>, label: &str, expected: f64) {
        let timestamps: Vec<Timestamp> = results.iter().map(|row| row.timestamp()).collect();
        assert_eq!(timestamps, vec![ts(HOUR_START), ts(HOUR_END)]);
        for row in results.iter() {
            assert_eq!(row.len(), 1);
            assert_value(row, label, expected);
        }
    }

    #[test]
    fn test_gauge() {
        let descriptor = ResultDescriptor::builder()
            .step(Duration::seconds(300))
            .datasource_with_heartbeat("m0-avg", "m0", Duration::seconds(600), ConsolidationFunction::Average)
            .export(["m0-avg"])
            .build()
            .unwrap();
        // Alternating runs of six 1s and six 3s
        let rows = two_hours(&["m0"], MetricType::Gauge, |i| {
            if i == 0 || ((i - 1) / 6) % 2 == 0 {
                1.0
            } else {
                3.0
            }
        });

        let results = processor(descriptor).process(MockOperator::boxed(rows)).unwrap();
        assert_hourly(&results, "m0-avg", 2.0);
    }

    #[test]
    fn test_counter_rate() {
        let descriptor = ResultDescriptor::builder()
            .step(Duration::seconds(300))
            .datasource("m0", "m0", ConsolidationFunction::Average)
            .export(["m0"])
            .build()
            .unwrap();
        let rows = two_hours(&["m0"], MetricType::Counter, |i| (3000 + i * 3000) as f64);

        let results = processor(descriptor).process(MockOperator::boxed(rows)).unwrap();
        assert_hourly(&results, "m0", 10.0);
    }

    #[test]
    fn test_calculated() {
        let descriptor = ResultDescriptor::builder()
            .step(Duration::seconds(300))
            .datasource("m0", "m0", ConsolidationFunction::Average)
            .datasource("m1", "m1", ConsolidationFunction::Average)
            .calculate("total", sum, &["m0", "m1"])
            .export(["total"])
            .build()
            .unwrap();
        let rows = two_hours(&["m0", "m1"], MetricType::Counter, |i| (3000 + i * 3000) as f64);

        let results = processor(descriptor).process(MockOperator::boxed(rows)).unwrap();
        assert_hourly(&results, "total", 20.0);
    }

    #[test]
    fn test_rejects_inverted_range() {
        let descriptor = ResultDescriptor::builder().build().unwrap();
        let err = ResultProcessor::new(resource(), ts(600), ts(300), descriptor, Duration::seconds(300))
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Configuration);
    }

    #[test]
    fn test_rejects_resolution_not_multiple_of_step() {
        let descriptor = ResultDescriptor::builder().build().unwrap();
        let err = ResultProcessor::new(resource(), ts(0), ts(3600), descriptor, Duration::seconds(450))
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Configuration);
        assert!(err.message.contains("450s"));
    }

    #[test]
    fn test_primary_start() {
        let descriptor = ResultDescriptor::builder().build().unwrap();
        let processor = processor(descriptor);
        assert_eq!(processor.params().primary_start(), ts(HOUR_START - 3600));
    }

    #[test]
    fn test_no_exports_yields_empty_rows() {
        let descriptor = ResultDescriptor::builder()
            .datasource("m0", "m0", ConsolidationFunction::Average)
            .build()
            .unwrap();
        let results = processor(descriptor).process(MockOperator::boxed(Vec::new())).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|row| row.is_empty()));
    }
}
