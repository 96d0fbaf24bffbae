//! Composable predicates over samples.
//!
//! Filters are applied lazily through iterator proxies (see
//! [`crate::buffer::SampleStream`]); chaining two filters yields the
//! subsequence satisfying both, in original order, without materializing
//! intermediate collections.

use crate::sample::{Sample, Timestamp};

/// A predicate over one sample.
pub trait SampleFilter {
    fn test(&self, sample: &Sample) -> bool;
}

/// Keeps samples with `value > threshold`.
pub struct GreaterThan(pub f64);

impl SampleFilter for GreaterThan {
    fn test(&self, sample: &Sample) -> bool {
        sample.value > self.0
    }
}

/// Keeps samples with `value < threshold`.
pub struct LessThan(pub f64);

impl SampleFilter for LessThan {
    fn test(&self, sample: &Sample) -> bool {
        sample.value < self.0
    }
}

/// Keeps samples with `min <= value <= max`.
pub struct InRange {
    pub min: f64,
    pub max: f64,
}

impl InRange {
    pub fn new(min: f64, max: f64) -> Self {
        InRange { min, max }
    }
}

impl SampleFilter for InRange {
    fn test(&self, sample: &Sample) -> bool {
        sample.value >= self.min && sample.value <= self.max
    }
}

/// Keeps samples taken at or after the given instant.
pub struct Since(pub Timestamp);

impl SampleFilter for Since {
    fn test(&self, sample: &Sample) -> bool {
        sample.taken >= self.0
    }
}

/// Keeps samples taken strictly before the given instant.
pub struct Until(pub Timestamp);

impl SampleFilter for Until {
    fn test(&self, sample: &Sample) -> bool {
        sample.taken < self.0
    }
}

/// Keeps samples taken in `[start, end)`.
pub struct InPeriod {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl InPeriod {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        InPeriod { start, end }
    }
}

impl SampleFilter for InPeriod {
    fn test(&self, sample: &Sample) -> bool {
        sample.taken >= self.start && sample.taken < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::testutil::{at, rssi};

    #[test]
    fn test_value_filters() {
        let s = rssi(100, -55.0);
        assert!(GreaterThan(-60.0).test(&s));
        assert!(!GreaterThan(-50.0).test(&s));
        assert!(LessThan(-50.0).test(&s));
        assert!(InRange::new(-60.0, -50.0).test(&s));
        assert!(!InRange::new(-50.0, -40.0).test(&s));
    }

    #[test]
    fn test_time_filters() {
        let s = rssi(100, -55.0);
        assert!(Since(at(100)).test(&s));
        assert!(!Since(at(101)).test(&s));
        assert!(Until(at(101)).test(&s));
        assert!(!Until(at(100)).test(&s));
        assert!(InPeriod::new(at(50), at(150)).test(&s));
        assert!(!InPeriod::new(at(50), at(100)).test(&s));
    }
}
