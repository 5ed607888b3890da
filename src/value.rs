//! Typed sample values
//!
//! Counter-like metrics (counters, derives and absolutes) are stored as raw
//! 64-bit words; gauges as floating point. The [`ValueType::delta`] operation
//! knows how each kind moves between two observations, including unsigned
//! counter wraparound.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const MAX_32: u64 = u32::MAX as u64;

/// Kind of metric a sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    /// Instantaneous reading
    Gauge,
    /// Monotonically increasing unsigned counter
    Counter,
    /// Counter that may legitimately decrease
    Derive,
    /// Counter reset on every read
    Absolute,
}

impl MetricType {
    /// True for metrics whose rate, not raw value, is meaningful
    pub fn is_accumulating(&self) -> bool {
        !matches!(self, MetricType::Gauge)
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricType::Gauge => "GAUGE",
            MetricType::Counter => "COUNTER",
            MetricType::Derive => "DERIVE",
            MetricType::Absolute => "ABSOLUTE",
        };
        f.write_str(name)
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GAUGE" => Ok(MetricType::Gauge),
            "COUNTER" => Ok(MetricType::Counter),
            "DERIVE" => Ok(MetricType::Derive),
            "ABSOLUTE" => Ok(MetricType::Absolute),
            other => Err(format!("unknown metric type '{}'", other)),
        }
    }
}

/// A typed numeric sample value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum ValueType {
    /// Floating point reading
    Gauge(f64),
    /// Unsigned counter
    Counter(u64),
    /// Counter word whose deltas are read as signed
    Derive(u64),
    /// Unsigned counter, reset on read
    Absolute(u64),
}

impl ValueType {
    /// Build a value of the given kind from a plain number
    ///
    /// Counter-like kinds keep the number's integer bits.
    pub fn compose(number: f64, metric_type: MetricType) -> ValueType {
        match metric_type {
            MetricType::Gauge => ValueType::Gauge(number),
            MetricType::Counter => ValueType::Counter(number as i64 as u64),
            MetricType::Derive => ValueType::Derive(number as i64 as u64),
            MetricType::Absolute => ValueType::Absolute(number as i64 as u64),
        }
    }

    /// Kind of this value
    pub fn metric_type(&self) -> MetricType {
        match self {
            ValueType::Gauge(_) => MetricType::Gauge,
            ValueType::Counter(_) => MetricType::Counter,
            ValueType::Derive(_) => MetricType::Derive,
            ValueType::Absolute(_) => MetricType::Absolute,
        }
    }

    /// Numeric value as a float
    pub fn to_f64(&self) -> f64 {
        match *self {
            ValueType::Gauge(v) => v,
            ValueType::Counter(v) | ValueType::Absolute(v) => v as f64,
            ValueType::Derive(v) => v as i64 as f64,
        }
    }

    /// Raw 64-bit word; gauges are truncated toward zero
    pub fn to_bits(&self) -> u64 {
        match *self {
            ValueType::Gauge(v) => v as i64 as u64,
            ValueType::Counter(v) | ValueType::Derive(v) | ValueType::Absolute(v) => v,
        }
    }

    /// True only for a NaN gauge
    pub fn is_nan(&self) -> bool {
        matches!(self, ValueType::Gauge(v) if v.is_nan())
    }

    /// Sum, keeping this value's kind
    pub fn plus(&self, other: &ValueType) -> ValueType {
        match *self {
            ValueType::Gauge(v) => ValueType::Gauge(v + other.to_f64()),
            ValueType::Counter(v) => ValueType::Counter(v.wrapping_add(other.to_bits())),
            ValueType::Derive(v) => ValueType::Derive(v.wrapping_add(other.to_bits())),
            ValueType::Absolute(v) => ValueType::Absolute(v.wrapping_add(other.to_bits())),
        }
    }

    /// Product with a scalar, keeping this value's kind
    pub fn times(&self, scalar: f64) -> ValueType {
        match *self {
            ValueType::Gauge(v) => ValueType::Gauge(v * scalar),
            ValueType::Counter(v) => ValueType::Counter((v as f64 * scalar) as u64),
            ValueType::Derive(v) => ValueType::Derive(((v as i64) as f64 * scalar) as i64 as u64),
            ValueType::Absolute(v) => ValueType::Absolute((v as f64 * scalar) as u64),
        }
    }

    /// Quotient with a scalar; always a gauge
    pub fn divide_by(&self, divisor: f64) -> ValueType {
        ValueType::Gauge(self.to_f64() / divisor)
    }

    /// True when a counter-like value moved backwards since `previous`
    pub fn wrapped(&self, previous: &ValueType) -> bool {
        match *self {
            ValueType::Counter(v) | ValueType::Absolute(v) => v < previous.to_bits(),
            ValueType::Gauge(_) | ValueType::Derive(_) => false,
        }
    }

    /// Change since `previous`, in this value's kind
    ///
    /// Counters that moved backwards are assumed to have wrapped. The width
    /// is taken to be 32 bits unless `previous` is too far ahead of the
    /// current word for a 32-bit wrap to explain it.
    pub fn delta(&self, previous: &ValueType) -> ValueType {
        match *self {
            ValueType::Gauge(v) => ValueType::Gauge(v - previous.to_f64()),
            ValueType::Counter(v) => ValueType::Counter(counter_delta(v, previous.to_bits())),
            ValueType::Absolute(v) => ValueType::Absolute(counter_delta(v, previous.to_bits())),
            ValueType::Derive(v) => ValueType::Derive(v.wrapping_sub(previous.to_bits())),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ValueType::Gauge(v) => write!(f, "{}", v),
            ValueType::Counter(v) | ValueType::Absolute(v) => write!(f, "{}", v),
            ValueType::Derive(v) => write!(f, "{}", v as i64),
        }
    }
}

fn counter_delta(current: u64, previous: u64) -> u64 {
    if current >= previous {
        return current - previous;
    }
    if previous as u128 > current as u128 + MAX_32 as u128 + 1 {
        // 64-bit wrap
        (u64::MAX - previous).wrapping_add(current).wrapping_add(1)
    } else {
        MAX_32
            .wrapping_sub(previous)
            .wrapping_add(current)
            .wrapping_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_delta() {
        let delta = ValueType::Counter(250).delta(&ValueType::Counter(100));
        assert_eq!(delta, ValueType::Counter(150));
    }

    #[test]
    fn test_counter_wrap_32() {
        let delta = ValueType::Counter(0).delta(&ValueType::Counter(0xFFFF_FFFF));
        assert_eq!(delta, ValueType::Counter(1));

        let delta = ValueType::Counter(2).delta(&ValueType::Counter(0xFFFF_FFFE));
        assert_eq!(delta, ValueType::Counter(4));

        let delta = ValueType::Counter(4).delta(&ValueType::Counter(0xFFFF_FFFA));
        assert_eq!(delta, ValueType::Counter(10));

        let delta = ValueType::Counter(1).delta(&ValueType::Counter(3));
        assert_eq!(delta, ValueType::Counter(4_294_967_294));
    }

    #[test]
    fn test_counter_wrap_64() {
        let delta = ValueType::Counter(0).delta(&ValueType::Counter(u64::MAX));
        assert_eq!(delta, ValueType::Counter(1));

        let delta = ValueType::Counter(2).delta(&ValueType::Counter(u64::MAX - 1));
        assert_eq!(delta, ValueType::Counter(4));

        let delta = ValueType::Counter(4).delta(&ValueType::Counter(0xFFFF_FFFF_FFFF_FFFA));
        assert_eq!(delta, ValueType::Counter(10));
    }

    #[test]
    fn test_absolute_behaves_as_counter() {
        let delta = ValueType::Absolute(0).delta(&ValueType::Absolute(0xFFFF_FFFF));
        assert_eq!(delta, ValueType::Absolute(1));
        assert!(ValueType::Absolute(0).wrapped(&ValueType::Absolute(5)));
    }

    #[test]
    fn test_derive_delta_is_signed() {
        let delta = ValueType::Derive(90).delta(&ValueType::Derive(100));
        assert_eq!(delta.to_f64(), -10.0);
        assert!(!ValueType::Derive(90).wrapped(&ValueType::Derive(100)));
    }

    #[test]
    fn test_gauge_delta_never_wraps() {
        let delta = ValueType::Gauge(1.5).delta(&ValueType::Gauge(4.0));
        assert_eq!(delta, ValueType::Gauge(-2.5));
    }

    #[test]
    fn test_arithmetic_keeps_kind() {
        assert_eq!(
            ValueType::Counter(10).plus(&ValueType::Counter(5)),
            ValueType::Counter(15)
        );
        assert_eq!(ValueType::Gauge(2.0).times(1.5), ValueType::Gauge(3.0));
        assert_eq!(ValueType::Counter(10).times(2.0), ValueType::Counter(20));
        assert_eq!(ValueType::Counter(3).divide_by(2.0), ValueType::Gauge(1.5));
    }

    #[test]
    fn test_compose() {
        assert_eq!(ValueType::compose(42.0, MetricType::Counter), ValueType::Counter(42));
        assert_eq!(ValueType::compose(-1.0, MetricType::Derive).to_f64(), -1.0);
        assert!(ValueType::compose(f64::NAN, MetricType::Gauge).is_nan());
    }

    #[test]
    fn test_metric_type_parse() {
        assert_eq!("counter".parse::<MetricType>().unwrap(), MetricType::Counter);
        assert!("histogram".parse::<MetricType>().is_err());
        assert!(MetricType::Derive.is_accumulating());
        assert!(!MetricType::Gauge.is_accumulating());
    }
}
