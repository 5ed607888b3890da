//! PrimaryData Operator - resampling onto the primary interval
//!
//! Raw samples arrive at arbitrary instants. This operator emits one row per
//! `step` bucket with one measurement per datasource, holding the time
//! weighted average of the samples covering the bucket.
//!
//! # Algorithm
//!
//! A bucket with ceiling `c` covers `(c - step, c]`. A sample at `t` whose
//! predecessor is at `l` closes the span `(l, t]` and its value is applied to
//! the part of that span inside the bucket. The span counts as known time when
//! the gap `t - l` is shorter than the datasource heartbeat, and as unknown
//! time otherwise. A NaN value over known time makes the bucket NaN. A bucket
//! whose unknown time is at least half of its total is NaN.
//!
//! When the last sample seen falls short of `c`, the next sample beyond `c`
//! covers the rest of the bucket. It is found in a lookahead buffer that is
//! read no further than `l + heartbeat`, and it is consumed again normally
//! when the following bucket opens.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::query::descriptor::ResultDescriptor;
use crate::query::error::QueryResult;
use crate::query::operators::{BoxedOperator, IntervalGenerator, RowOperator};
use crate::time::{Duration, Timestamp};
use crate::types::{merge_attributes, Attributes, Element, Measurement, Resource, Row, Sample};

// ============================================================================
// Accumulator
// ============================================================================

/// Running state for one datasource within the current bucket
#[derive(Debug, Default)]
struct Accumulator {
    last: Option<Timestamp>,
    known_ms: i64,
    unknown_ms: i64,
    weighted: f64,
    attributes: Option<Attributes>,
}

impl Accumulator {
    /// Account for `sample`, which lies at or before the bucket ceiling
    fn advance(&mut self, sample: &Sample, floor: Timestamp, heartbeat: Duration) {
        let timestamp = sample.timestamp();

        // The first sample only marks where coverage starts
        if let Some(last) = self.last {
            let lower = last.max(floor);
            if timestamp > lower {
                self.accumulate(
                    millis_between(timestamp, lower),
                    is_known(timestamp, last, heartbeat),
                    sample.value().to_f64(),
                );
            }
            if timestamp > floor {
                merge_attributes(&mut self.attributes, sample.attributes());
            }
        }

        self.last = Some(timestamp);
    }

    fn accumulate(&mut self, span_ms: i64, known: bool, value: f64) {
        if known {
            self.known_ms += span_ms;
            self.weighted += value * span_ms as f64;
        } else {
            self.unknown_ms += span_ms;
        }
    }

    fn average(&self) -> f64 {
        let total = self.known_ms + self.unknown_ms;
        if self.known_ms == 0 || self.unknown_ms * 2 >= total {
            return f64::NAN;
        }
        self.weighted / self.known_ms as f64
    }

    /// Finish the bucket, keeping the last sample position
    fn close(&mut self) -> (f64, Option<Attributes>) {
        let average = self.average();
        let attributes = self.attributes.take();
        self.known_ms = 0;
        self.unknown_ms = 0;
        self.weighted = 0.0;
        (average, attributes)
    }
}

fn is_known(timestamp: Timestamp, last: Timestamp, heartbeat: Duration) -> bool {
    millis_between(timestamp, last) < heartbeat.as_millis()
}

fn millis_between(later: Timestamp, earlier: Timestamp) -> i64 {
    later.as_millis() - earlier.as_millis()
}

/// Outcome of searching past the bucket ceiling for a datasource's next sample
enum CarryOver {
    Found(Sample),
    Stale,
    End,
}

// ============================================================================
// Operator
// ============================================================================

/// Primary data point stage
pub struct PrimaryData {
    input: BoxedOperator<Sample>,
    input_exhausted: bool,
    descriptor: Arc<ResultDescriptor>,
    resource: Resource,
    timestamps: IntervalGenerator,
    lookahead: VecDeque<Row<Sample>>,
    /// Indexed like `descriptor.datasources()`
    accumulators: Vec<Accumulator>,
}

impl PrimaryData {
    /// Resample `input` over `[start, end]`, widened to whole steps
    pub fn new(
        input: BoxedOperator<Sample>,
        resource: Resource,
        start: Timestamp,
        end: Timestamp,
        descriptor: Arc<ResultDescriptor>,
    ) -> Self {
        let interval = descriptor.step();
        let timestamps = IntervalGenerator::new(
            start.step_floor(interval),
            end.step_ceiling(interval),
            interval,
        );
        let accumulators = descriptor
            .datasources()
            .iter()
            .map(|_| Accumulator::default())
            .collect();

        Self {
            input,
            input_exhausted: false,
            descriptor,
            resource,
            timestamps,
            lookahead: VecDeque::new(),
            accumulators,
        }
    }

    /// Next input row at or before `ceiling`
    fn next_input_until(&mut self, ceiling: Timestamp) -> QueryResult<Option<Row<Sample>>> {
        if let Some(front) = self.lookahead.front() {
            if front.timestamp() <= ceiling {
                return Ok(self.lookahead.pop_front());
            }
            return Ok(None);
        }
        if self.input_exhausted {
            return Ok(None);
        }

        match self.input.next_row()? {
            Some(row) if row.timestamp() <= ceiling => Ok(Some(row)),
            Some(row) => {
                self.lookahead.push_back(row);
                Ok(None)
            }
            None => {
                self.input_exhausted = true;
                Ok(None)
            }
        }
    }

    /// Move one more input row into the lookahead buffer
    fn pull(&mut self) -> QueryResult<bool> {
        if self.input_exhausted {
            return Ok(false);
        }
        match self.input.next_row()? {
            Some(row) => {
                self.lookahead.push_back(row);
                Ok(true)
            }
            None => {
                self.input_exhausted = true;
                Ok(false)
            }
        }
    }

    /// First sample of `source` in the lookahead, reading no further than `horizon`
    fn find_next(&mut self, source: &str, horizon: Timestamp) -> QueryResult<CarryOver> {
        let mut position = 0;
        loop {
            if position == self.lookahead.len() && !self.pull()? {
                return Ok(CarryOver::End);
            }
            let row = &self.lookahead[position];
            if let Some(sample) = row.element(source) {
                return Ok(CarryOver::Found(sample.clone()));
            }
            if row.timestamp() >= horizon {
                return Ok(CarryOver::Stale);
            }
            position += 1;
        }
    }
}

impl RowOperator<Measurement> for PrimaryData {
    fn next_row(&mut self) -> QueryResult<Option<Row<Measurement>>> {
        let Some(ceiling) = self.timestamps.next() else {
            return Ok(None);
        };
        let floor = ceiling.minus(self.descriptor.step());
        let descriptor = Arc::clone(&self.descriptor);
        let datasources = descriptor.datasources();

        while let Some(row) = self.next_input_until(ceiling)? {
            for (datasource, accumulator) in datasources.iter().zip(&mut self.accumulators) {
                if let Some(sample) = row.element(datasource.source()) {
                    accumulator.advance(sample, floor, datasource.heartbeat());
                }
            }
        }

        for (index, datasource) in datasources.iter().enumerate() {
            let Some(last) = self.accumulators[index].last else {
                continue;
            };
            if last >= ceiling {
                continue;
            }

            let lower = last.max(floor);
            let span = millis_between(ceiling, lower);
            match self.find_next(datasource.source(), last.plus(datasource.heartbeat()))? {
                CarryOver::Found(next) => {
                    let known = is_known(next.timestamp(), last, datasource.heartbeat());
                    let accumulator = &mut self.accumulators[index];
                    accumulator.accumulate(span, known, next.value().to_f64());
                    merge_attributes(&mut accumulator.attributes, next.attributes());
                }
                CarryOver::Stale => self.accumulators[index].accumulate(span, false, f64::NAN),
                CarryOver::End => {}
            }
        }

        let mut output = Row::with_capacity(ceiling, self.resource.clone(), datasources.len());
        for (datasource, accumulator) in datasources.iter().zip(&mut self.accumulators) {
            let (value, attributes) = accumulator.close();
            output.add_element(Measurement::new(
                ceiling,
                self.resource.clone(),
                datasource.label(),
                value,
                attributes,
            ));
        }

        trace!(
            resource = %self.resource,
            timestamp = %ceiling,
            buffered = self.lookahead.len(),
            "Primary data point"
        );

        Ok(Some(output))
    }

    fn name(&self) -> &'static str {
        "PrimaryData"
    }
}
