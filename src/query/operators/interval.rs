//! Aligned timestamp lattice

use crate::time::{Duration, Timestamp};

/// Lazily yields `start, start + interval, ...` up to and including `finish`
///
/// In reversed mode the walk begins at `finish` and steps down toward
/// `start`. The generator is single-pass; exhaustion is `None`.
#[derive(Debug, Clone)]
pub struct IntervalGenerator {
    interval: Duration,
    start: Timestamp,
    finish: Timestamp,
    current: Option<Timestamp>,
    reversed: bool,
}

impl IntervalGenerator {
    /// Ascending walk over `[start, finish]`
    pub fn new(start: Timestamp, finish: Timestamp, interval: Duration) -> Self {
        Self::with_direction(start, finish, interval, false)
    }

    /// Descending walk from `finish` toward `start`
    pub fn reversed(start: Timestamp, finish: Timestamp, interval: Duration) -> Self {
        Self::with_direction(start, finish, interval, true)
    }

    fn with_direction(
        start: Timestamp,
        finish: Timestamp,
        interval: Duration,
        reversed: bool,
    ) -> Self {
        let first = if reversed { finish } else { start };
        Self {
            interval,
            start,
            finish,
            current: (start <= finish).then_some(first),
            reversed,
        }
    }

    /// True while at least one timestamp remains
    pub fn has_next(&self) -> bool {
        self.current.is_some()
    }

    /// Step between consecutive timestamps
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Iterator for IntervalGenerator {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Timestamp> {
        let current = self.current?;

        self.current = if self.interval.is_zero() {
            None
        } else if self.reversed {
            let next = current.minus(self.interval);
            (next >= self.start).then_some(next)
        } else {
            let next = current.plus(self.interval);
            (next <= self.finish).then_some(next)
        };

        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let Some(current) = self.current else {
            return (0, Some(0));
        };
        if self.interval.is_zero() {
            return (1, Some(1));
        }
        let span = if self.reversed {
            current.duration_since(self.start)
        } else {
            self.finish.duration_since(current)
        };
        let remaining = span
            .map(|span| span.divide_by(self.interval).floor() as usize + 1)
            .unwrap_or(0);
        (remaining, Some(remaining))
    }
}
