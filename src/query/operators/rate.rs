//! Rate Operator - per-second rates for accumulating metrics
//!
//! Counters, derives and absolutes are only meaningful as rates of change.
//! For each requested metric this operator replaces an accumulating sample
//! with a gauge holding `delta(value, previous) / elapsed_seconds`; gauges
//! pass through untouched. Metrics that were not requested are dropped.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::query::error::QueryResult;
use crate::query::operators::{BoxedOperator, RowOperator};
use crate::time::Timestamp;
use crate::types::{Element, Row, Sample};
use crate::value::ValueType;

/// What a counter that moved backwards produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterWrap {
    /// Assume the counter wrapped and compute the rate across the wrap
    #[default]
    Wrap,
    /// Report the rate as unknown (NaN)
    Unknown,
}

/// Rate conversion stage
pub struct Rate {
    input: BoxedOperator<Sample>,
    metrics: Vec<String>,
    /// Last observation per metric, indexed like `metrics`
    previous: Vec<Option<(Timestamp, ValueType)>>,
    counter_wrap: CounterWrap,
}

impl Rate {
    /// Convert the `metrics` of `input`
    pub fn new(input: BoxedOperator<Sample>, metrics: Vec<String>) -> Self {
        let previous = vec![None; metrics.len()];
        Self {
            input,
            metrics,
            previous,
            counter_wrap: CounterWrap::default(),
        }
    }

    /// Set the counter wrap policy
    pub fn with_counter_wrap(mut self, counter_wrap: CounterWrap) -> Self {
        self.counter_wrap = counter_wrap;
        self
    }
}

impl RowOperator<Sample> for Rate {
    fn next_row(&mut self) -> QueryResult<Option<Row<Sample>>> {
        let Some(working) = self.input.next_row()? else {
            return Ok(None);
        };

        let mut result = Row::with_capacity(
            working.timestamp(),
            working.resource().clone(),
            self.metrics.len(),
        );
        let mut samples = working.into_elements();

        for (index, metric) in self.metrics.iter().enumerate() {
            let Some(position) = samples.iter().position(|s| s.name() == metric) else {
                continue;
            };
            let sample = samples.swap_remove(position);
            let previous = self.previous[index].replace((sample.timestamp(), sample.value()));

            if sample.metric_type().is_accumulating() {
                let rate = per_second(&sample, previous, self.counter_wrap);
                result.add_element(sample.with_value(rate));
            } else {
                result.add_element(sample);
            }
        }

        Ok(Some(result))
    }

    fn name(&self) -> &'static str {
        "Rate"
    }
}

fn per_second(
    sample: &Sample,
    previous: Option<(Timestamp, ValueType)>,
    counter_wrap: CounterWrap,
) -> ValueType {
    let unknown = ValueType::Gauge(f64::NAN);

    let Some((previous_ts, previous_value)) = previous else {
        return unknown;
    };
    let elapsed = match sample.timestamp().duration_since(previous_ts) {
        Some(elapsed) if !elapsed.is_zero() => elapsed.as_seconds_f64(),
        _ => return unknown,
    };

    let value = sample.value();
    if value.wrapped(&previous_value) {
        debug!(
            metric = sample.name(),
            resource = %sample.resource(),
            previous = %previous_value,
            current = %value,
            "Counter wrapped"
        );
        if counter_wrap == CounterWrap::Unknown {
            return unknown;
        }
    }

    value.delta(&previous_value).divide_by(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::operators::testing::*;
    use crate::value::MetricType;

    fn metrics(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn counters(values: &[(i64, f64)]) -> Vec<Row<Sample>> {
        values
            .iter()
            .fold(SampleRows::new(), |rows, (seconds, value)| {
                rows.row(*seconds)
                    .element("m1", ValueType::compose(*value, MetricType::Counter))
            })
            .build()
    }

    fn rates(rate: &mut Rate) -> Vec<f64> {
        let mut out = Vec::new();
        while let Some(row) = rate.next_row().unwrap() {
            out.push(row.element("m1").unwrap().value().to_f64());
        }
        out
    }

    fn assert_rates(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            if e.is_nan() {
                assert!(a.is_nan(), "expected NaN, got {}", a);
            } else {
                assert!((a - e).abs() < 0.0001, "expected {}, got {}", e, a);
            }
        }
    }

    #[test]
    fn test_rates() {
        let mut rows = SampleRows::new();
        for i in 1..=10i64 {
            rows = rows.row(i);
            for j in 0..2i64 {
                rows = rows.element(&format!("bytes.{}", j + 1), ValueType::Counter(((i + j) * 100) as u64));
            }
        }
        let mut rate = Rate::new(MockOperator::boxed(rows.build()), metrics(&["bytes.1", "bytes.2"]));

        for i in 1..=10 {
            let row = rate.next_row().unwrap().expect("insufficient rows");
            assert_eq!(row.timestamp(), ts(i));
            assert_eq!(row.resource(), &resource());
            assert_eq!(row.len(), 2);
            for sample in row.elements() {
                assert_eq!(sample.metric_type(), MetricType::Gauge);
                if i == 1 {
                    assert!(sample.value().is_nan());
                } else {
                    assert_eq!(sample.value().to_f64(), 100.0);
                }
            }
        }
        assert!(rate.next_row().unwrap().is_none());
    }

    #[test]
    fn test_missing_sample_uses_older_previous() {
        let rows = SampleRows::new()
            .row(1)
            .element("bytes.1", ValueType::Counter(0))
            .element("bytes.2", ValueType::Counter(0))
            .row(2)
            .element("bytes.1", ValueType::Counter(100))
            .element("bytes.2", ValueType::Counter(100))
            .row(3)
            .element("bytes.2", ValueType::Counter(200))
            .row(4)
            .element("bytes.1", ValueType::Counter(300))
            .element("bytes.2", ValueType::Counter(300))
            .build();
        let mut rate = Rate::new(MockOperator::boxed(rows), metrics(&["bytes.1", "bytes.2"]));

        let row = rate.next_row().unwrap().unwrap();
        assert!(row.element("bytes.1").unwrap().value().is_nan());
        let row = rate.next_row().unwrap().unwrap();
        assert_eq!(row.element("bytes.1").unwrap().value().to_f64(), 100.0);
        let row = rate.next_row().unwrap().unwrap();
        assert!(row.element("bytes.1").is_none());
        // 200 over the 2 seconds since row 2
        let row = rate.next_row().unwrap().unwrap();
        assert_eq!(row.element("bytes.1").unwrap().value().to_f64(), 100.0);
    }

    #[test]
    fn test_rates_with_decimals() {
        let rows = counters(&[
            (1414598400, 9223372034564703200.00),
            (1414602000, 9223372034601613300.00),
            (1414605600, 9223372034604530700.00),
            (1414609200, 9223372034608910300.00),
            (1414612800, 9223372034636612600.00),
            (1414616400, 9223372034639099900.00),
            (1414620000, 9223372034641185800.00),
            (1414623600, 9223372034642181100.00),
        ]);
        let mut rate = Rate::new(MockOperator::boxed(rows), metrics(&["m1"]));
        assert_rates(
            &rates(&mut rate),
            &[
                f64::NAN,
                10252.800000,
                810.382222,
                1216.568889,
                7695.075556,
                690.915556,
                579.413333,
                276.480000,
            ],
        );
    }

    #[test]
    fn test_counter_wrap() {
        let input = [(1, 1.0), (2, 2.0), (3, 3.0), (4, 1.0), (5, 2.0), (6, 3.0)];
        let mut rate = Rate::new(MockOperator::boxed(counters(&input)), metrics(&["m1"]));
        assert_rates(
            &rates(&mut rate),
            &[f64::NAN, 1.0, 1.0, 4.294967294E9, 1.0, 1.0],
        );
    }

    #[test]
    fn test_unknown_on_counter_wrap() {
        let input = [(1, 1.0), (2, 2.0), (3, 3.0), (4, 1.0), (5, 2.0), (6, 3.0)];
        let mut rate = Rate::new(MockOperator::boxed(counters(&input)), metrics(&["m1"]))
            .with_counter_wrap(CounterWrap::Unknown);
        assert_rates(&rates(&mut rate), &[f64::NAN, 1.0, 1.0, f64::NAN, 1.0, 1.0]);
    }

    #[test]
    fn test_gauges_pass_through_and_unrequested_dropped() {
        let rows = SampleRows::new()
            .row(1)
            .gauge("temp", 21.5)
            .element("other", ValueType::Counter(7))
            .build();
        let mut rate = Rate::new(MockOperator::boxed(rows), metrics(&["temp"]));
        let row = rate.next_row().unwrap().unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row.element("temp").unwrap().value(), ValueType::Gauge(21.5));
    }

    #[test]
    fn test_fractional_elapsed_time() {
        let start = ts(0);
        let mut first = Row::new(start, resource());
        first.add_element(Sample::new(start, resource(), "m1", ValueType::Derive(100)));
        let later = Timestamp::from_epoch_millis(500);
        let mut second = Row::new(later, resource());
        second.add_element(Sample::new(later, resource(), "m1", ValueType::Derive(90)));

        let mut rate = Rate::new(MockOperator::boxed(vec![first, second]), metrics(&["m1"]));
        rate.next_row().unwrap();
        let row = rate.next_row().unwrap().unwrap();
        assert_eq!(row.element("m1").unwrap().value().to_f64(), -20.0);
    }

    #[test]
    fn test_empty_input() {
        let mut rate = Rate::new(MockOperator::boxed(Vec::new()), metrics(&["m1"]));
        assert!(rate.next_row().unwrap().is_none());
    }
}
