//! Sample sources
//!
//! The pipeline reads raw samples through the [`SampleSource`] trait. A source
//! returns, for one resource and an inclusive time range, the matching rows in
//! ascending timestamp order. [`InMemorySampleSource`] is a thread-safe store
//! suitable for tests, benchmarks and embedding.
//!
//! # Example
//!
//! ```rust
//! use kuba_rollup::source::{InMemorySampleSource, SampleSource};
//! use kuba_rollup::time::Timestamp;
//! use kuba_rollup::types::{Resource, Sample};
//! use kuba_rollup::value::ValueType;
//!
//! let source = InMemorySampleSource::new();
//! let resource = Resource::new("localhost");
//! for i in 0..3 {
//!     let ts = Timestamp::from_epoch_seconds(i * 300);
//!     source.insert(Sample::new(ts, resource.clone(), "load", ValueType::Gauge(i as f64)));
//! }
//!
//! let rows: Vec<_> = source
//!     .select(&resource, Timestamp::from_epoch_seconds(300), Timestamp::from_epoch_seconds(600))
//!     .unwrap()
//!     .collect();
//! assert_eq!(rows.len(), 2);
//! ```

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::SourceError;
use crate::time::Timestamp;
use crate::types::{Element, Resource, Row, Sample};

/// Owned stream of rows; each row may fail individually
pub type RowStream<T> = Box<dyn Iterator<Item = Result<Row<T>, SourceError>> + Send>;

/// Stream of raw sample rows
pub type SampleStream = RowStream<Sample>;

/// Read access to stored samples
pub trait SampleSource: Send + Sync {
    /// Rows of `resource` with timestamps in `[start, end]`, ascending
    fn select(
        &self,
        resource: &Resource,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<SampleStream, SourceError>;
}

/// In-memory sample store
///
/// Samples are grouped into one row per resource and timestamp. Reads take a
/// snapshot of the requested range, so a stream never holds the lock.
#[derive(Debug, Default)]
pub struct InMemorySampleSource {
    series: RwLock<HashMap<Resource, BTreeMap<Timestamp, Row<Sample>>>>,
}

impl InMemorySampleSource {
    /// Create a new empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one sample, replacing a same-named sample at the same instant
    pub fn insert(&self, sample: Sample) {
        let mut series = self.series.write();
        Self::insert_locked(&mut series, sample);
    }

    /// Store many samples under a single lock acquisition
    pub fn insert_all<I>(&self, samples: I)
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut series = self.series.write();
        for sample in samples {
            Self::insert_locked(&mut series, sample);
        }
    }

    fn insert_locked(
        series: &mut HashMap<Resource, BTreeMap<Timestamp, Row<Sample>>>,
        sample: Sample,
    ) {
        let resource = sample.resource().clone();
        let timestamp = sample.timestamp();
        series
            .entry(resource.clone())
            .or_default()
            .entry(timestamp)
            .or_insert_with(|| Row::new(timestamp, resource))
            .add_element(sample);
    }

    /// Resources with at least one sample
    pub fn resources(&self) -> Vec<Resource> {
        let mut resources: Vec<Resource> = self.series.read().keys().cloned().collect();
        resources.sort();
        resources
    }

    /// Total number of stored samples
    pub fn sample_count(&self) -> usize {
        self.series
            .read()
            .values()
            .flat_map(|rows| rows.values())
            .map(|row| row.len())
            .sum()
    }
}

impl SampleSource for InMemorySampleSource {
    fn select(
        &self,
        resource: &Resource,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<SampleStream, SourceError> {
        if start > end {
            return Ok(Box::new(std::iter::empty()));
        }

        let rows: Vec<Row<Sample>> = self
            .series
            .read()
            .get(resource)
            .map(|rows| rows.range(start..=end).map(|(_, row)| row.clone()).collect())
            .unwrap_or_default();

        debug!(
            resource = %resource,
            start = %start,
            end = %end,
            rows = rows.len(),
            "Selected samples"
        );

        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}
