//! Unit-aware instants and spans
//!
//! [`Timestamp`] and [`Duration`] remember the [`TimeUnit`] they were created
//! with. Arithmetic between two operands is carried out in the finer of the two
//! units, so mixing seconds and milliseconds never truncates. Comparison,
//! equality and hashing are defined on the instant itself: `1s == 1000ms`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Sub};
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{digit1, multispace0},
    combinator::{all_consuming, map_res},
    sequence::{delimited, pair},
    IResult,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DescriptorError;

// ============================================================================
// Time Unit
// ============================================================================

/// Granularity of a [`Timestamp`] or [`Duration`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Nanoseconds
    Nanoseconds,
    /// Microseconds
    Microseconds,
    /// Milliseconds
    Milliseconds,
    /// Seconds
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
    /// Days
    Days,
}

impl TimeUnit {
    /// Length of one unit in nanoseconds
    pub const fn nanos(self) -> i64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60 * 1_000_000_000,
            TimeUnit::Hours => 3_600 * 1_000_000_000,
            TimeUnit::Days => 86_400 * 1_000_000_000,
        }
    }

    /// The finer of two units
    pub fn finest(self, other: TimeUnit) -> TimeUnit {
        if self.nanos() <= other.nanos() {
            self
        } else {
            other
        }
    }

    /// Convert `value` expressed in `from` into this unit
    ///
    /// Conversion to a coarser unit truncates toward zero; conversion to a
    /// finer unit saturates instead of overflowing.
    pub fn convert(self, value: i64, from: TimeUnit) -> i64 {
        let (from_ns, to_ns) = (from.nanos(), self.nanos());
        if from_ns >= to_ns {
            value.saturating_mul(from_ns / to_ns)
        } else {
            value / (to_ns / from_ns)
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "m",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }
}

// ============================================================================
// Duration
// ============================================================================

/// A non-negative span of time
#[derive(Debug, Clone, Copy)]
pub struct Duration {
    value: i64,
    unit: TimeUnit,
}

impl Duration {
    /// Zero-length span
    pub const ZERO: Duration = Duration::new(0, TimeUnit::Milliseconds);

    /// Create a duration; negative values are clamped to zero
    pub const fn new(value: i64, unit: TimeUnit) -> Self {
        let value = if value < 0 { 0 } else { value };
        Self { value, unit }
    }

    /// Span of `value` milliseconds
    pub const fn millis(value: i64) -> Self {
        Self::new(value, TimeUnit::Milliseconds)
    }

    /// Span of `value` seconds
    pub const fn seconds(value: i64) -> Self {
        Self::new(value, TimeUnit::Seconds)
    }

    /// Span of `value` minutes
    pub const fn minutes(value: i64) -> Self {
        Self::new(value, TimeUnit::Minutes)
    }

    /// Span of `value` hours
    pub const fn hours(value: i64) -> Self {
        Self::new(value, TimeUnit::Hours)
    }

    /// Span of `value` days
    pub const fn days(value: i64) -> Self {
        Self::new(value, TimeUnit::Days)
    }

    /// Raw magnitude in [`Self::unit`]
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Unit the duration was expressed in
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Magnitude expressed in `unit`
    pub fn convert(&self, unit: TimeUnit) -> i64 {
        unit.convert(self.value, self.unit)
    }

    /// Whole milliseconds
    pub fn as_millis(&self) -> i64 {
        self.convert(TimeUnit::Milliseconds)
    }

    /// Whole seconds
    pub fn as_seconds(&self) -> i64 {
        self.convert(TimeUnit::Seconds)
    }

    /// Fractional seconds, exact down to the duration's own unit
    pub fn as_seconds_f64(&self) -> f64 {
        self.value as f64 * self.unit.nanos() as f64 / TimeUnit::Seconds.nanos() as f64
    }

    /// True for a zero-length span
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Sum of two spans
    pub fn plus(&self, other: Duration) -> Duration {
        let unit = self.unit.finest(other.unit);
        Duration::new(self.convert(unit).saturating_add(other.convert(unit)), unit)
    }

    /// Difference of two spans, `None` if it would be negative
    pub fn checked_minus(&self, other: Duration) -> Option<Duration> {
        let unit = self.unit.finest(other.unit);
        let diff = self.convert(unit) - other.convert(unit);
        (diff >= 0).then(|| Duration::new(diff, self.unit.finest(other.unit)))
    }

    /// Span scaled by a whole factor
    pub fn times(&self, factor: i64) -> Duration {
        Duration::new(self.value.saturating_mul(factor), self.unit)
    }

    /// Ratio of two spans
    pub fn divide_by(&self, other: Duration) -> f64 {
        let unit = self.unit.finest(other.unit);
        self.convert(unit) as f64 / other.convert(unit) as f64
    }

    /// True when `self` is a whole, non-zero multiple of `other`
    ///
    /// Equal spans count as a multiple.
    pub fn is_multiple_of(&self, other: Duration) -> bool {
        let unit = self.unit.finest(other.unit);
        let (this, that) = (self.convert(unit), other.convert(unit));
        that > 0 && this >= that && this % that == 0
    }

    fn as_nanos(&self) -> i128 {
        self.value as i128 * self.unit.nanos() as i128
    }
}

impl PartialEq for Duration {
    fn eq(&self, other: &Self) -> bool {
        self.as_nanos() == other.as_nanos()
    }
}

impl Eq for Duration {}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Duration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_nanos().cmp(&other.as_nanos())
    }
}

impl Hash for Duration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_nanos().hash(state);
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

/// Parse a duration literal such as `300s`, `5m` or `250ms`
fn parse_duration(input: &str) -> IResult<&str, Duration> {
    let (input, (value, unit)) = pair(
        map_res(digit1, |digits: &str| digits.parse::<i64>()),
        alt((
            tag("ns"),
            tag("us"),
            tag("ms"),
            tag("s"),
            tag("m"),
            tag("h"),
            tag("d"),
            tag("w"),
        )),
    )(input)?;

    let duration = match unit {
        "ns" => Duration::new(value, TimeUnit::Nanoseconds),
        "us" => Duration::new(value, TimeUnit::Microseconds),
        "ms" => Duration::millis(value),
        "s" => Duration::seconds(value),
        "m" => Duration::minutes(value),
        "h" => Duration::hours(value),
        "d" => Duration::days(value),
        _ => Duration::days(value.saturating_mul(7)),
    };

    Ok((input, duration))
}

impl FromStr for Duration {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(delimited(multispace0, parse_duration, multispace0))(s)
            .map(|(_, duration)| duration)
            .map_err(|_| DescriptorError::InvalidDuration(s.to_string()))
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

// ============================================================================
// Timestamp
// ============================================================================

/// An instant relative to the Unix epoch
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    time: i64,
    unit: TimeUnit,
}

impl Timestamp {
    /// Create a timestamp of `time` units since the epoch
    pub const fn new(time: i64, unit: TimeUnit) -> Self {
        Self { time, unit }
    }

    /// Seconds since the epoch
    pub const fn from_epoch_seconds(seconds: i64) -> Self {
        Self::new(seconds, TimeUnit::Seconds)
    }

    /// Milliseconds since the epoch
    pub const fn from_epoch_millis(millis: i64) -> Self {
        Self::new(millis, TimeUnit::Milliseconds)
    }

    /// Current wall-clock time at millisecond granularity
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Convert from a chrono UTC datetime
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self::from_epoch_millis(datetime.timestamp_millis())
    }

    /// Convert to a chrono UTC datetime, `None` when out of chrono's range
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.as_millis()).single()
    }

    /// Raw magnitude in [`Self::unit`]
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Unit the timestamp was expressed in
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Magnitude expressed in `unit`
    pub fn convert(&self, unit: TimeUnit) -> i64 {
        unit.convert(self.time, self.unit)
    }

    /// Milliseconds since the epoch
    pub fn as_millis(&self) -> i64 {
        self.convert(TimeUnit::Milliseconds)
    }

    /// Seconds since the epoch
    pub fn as_seconds(&self) -> i64 {
        self.convert(TimeUnit::Seconds)
    }

    /// Instant `duration` later
    pub fn plus(&self, duration: Duration) -> Timestamp {
        let unit = self.unit.finest(duration.unit());
        Timestamp::new(
            self.convert(unit).saturating_add(duration.convert(unit)),
            unit,
        )
    }

    /// Instant `duration` earlier
    pub fn minus(&self, duration: Duration) -> Timestamp {
        let unit = self.unit.finest(duration.unit());
        Timestamp::new(
            self.convert(unit).saturating_sub(duration.convert(unit)),
            unit,
        )
    }

    /// Span from `earlier` to `self`, `None` when `earlier` is after `self`
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        if earlier > *self {
            return None;
        }
        let unit = self.unit.finest(earlier.unit);
        Some(Duration::new(self.convert(unit) - earlier.convert(unit), unit))
    }

    /// Largest multiple of `step` (from the epoch) not after this instant
    pub fn step_floor(&self, step: Duration) -> Timestamp {
        let unit = self.unit.finest(step.unit());
        let (time, step) = (self.convert(unit), step.convert(unit));
        if step == 0 {
            return Timestamp::new(time, unit);
        }
        Timestamp::new(time.div_euclid(step) * step, unit)
    }

    /// Smallest multiple of `step` (from the epoch) not before this instant
    pub fn step_ceiling(&self, step: Duration) -> Timestamp {
        let unit = self.unit.finest(step.unit());
        let (time, step) = (self.convert(unit), step.convert(unit));
        if step == 0 || time.rem_euclid(step) == 0 {
            return Timestamp::new(time, unit);
        }
        Timestamp::new((time.div_euclid(step) + 1) * step, unit)
    }

    fn as_nanos(&self) -> i128 {
        self.time as i128 * self.unit.nanos() as i128
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.as_nanos() == other.as_nanos()
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_nanos().cmp(&other.as_nanos())
    }
}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_nanos().hash(state);
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        self.plus(rhs)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Timestamp {
        self.minus(rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_datetime() {
            Some(datetime) => write!(f, "{}", datetime.to_rfc3339()),
            None => write!(f, "{}{}", self.time, self.unit.suffix()),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_millis())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Timestamp::from_epoch_millis)
    }
}
