//! Streaming aggregates over a sample window.
//!
//! An [`Aggregate`] is a (possibly multi-pass) reducer: it declares how many
//! full passes over the data it needs (`runs`), receives `begin_run` /
//! `map` calls for each pass, and produces one scalar (or nothing) from
//! `reduce`. Most aggregates are single-pass; `Variance` needs two because
//! it fixes the mean after the first pass.
//!
//! Failure is absence: `reduce` returns `None` when there is not enough
//! data, never an error.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::sample::Sample;

/// A multi-pass reducer producing one scalar from a sample stream.
pub trait Aggregate {
    /// Number of full passes over the data this aggregate requires.
    fn runs(&self) -> usize {
        1
    }

    /// Called once before each pass, with the 1-based pass number.
    fn begin_run(&mut self, this_run: usize);

    /// Called once per sample in each pass.
    fn map(&mut self, sample: &Sample);

    /// The result, or `None` if there is insufficient data.
    fn reduce(&self) -> Option<f64>;

    /// Return the aggregate to its initial state for reuse.
    fn reset(&mut self);
}

/// Results of evaluating several aggregates over the same window,
/// in the order they were given.
pub struct Summary {
    results: Vec<Option<f64>>,
}

impl Summary {
    pub(crate) fn new(results: Vec<Option<f64>>) -> Self {
        Summary { results }
    }

    /// Result of the `index`-th aggregate passed to `aggregate()`.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.results.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Arithmetic mean.
#[derive(Debug, Default)]
pub struct Mean {
    count: u64,
    sum: f64,
}

impl Mean {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregate for Mean {
    fn begin_run(&mut self, _this_run: usize) {}

    fn map(&mut self, sample: &Sample) {
        self.count += 1;
        self.sum += sample.value;
    }

    fn reduce(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / self.count as f64)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Sample variance, computed in two passes: pass 1 accumulates the mean,
/// pass 2 accumulates squared deviation from that fixed mean.
#[derive(Debug, Default)]
pub struct Variance {
    run: usize,
    count: u64,
    sum: f64,
    mean: f64,
    squared_deviation: f64,
}

impl Variance {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregate for Variance {
    fn runs(&self) -> usize {
        2
    }

    fn begin_run(&mut self, this_run: usize) {
        self.run = this_run;
        if this_run == 2 {
            // Fix the mean from pass 1, restart counting for pass 2.
            if self.count > 0 {
                self.mean = self.sum / self.count as f64;
            }
            self.count = 0;
            self.squared_deviation = 0.0;
        }
    }

    fn map(&mut self, sample: &Sample) {
        if self.run == 1 {
            self.count += 1;
            self.sum += sample.value;
        } else {
            self.count += 1;
            let delta = sample.value - self.mean;
            self.squared_deviation += delta * delta;
        }
    }

    fn reduce(&self) -> Option<f64> {
        if self.run < 2 || self.count < 2 {
            return None;
        }
        Some(self.squared_deviation / (self.count - 1) as f64)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Total-order f64 key so values can live in a BTreeMap.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrdF64(f64);

impl Eq for OrdF64 {}

impl PartialOrd for OrdF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Most frequent value. Ties resolve to the larger value; callers rely on
/// this when two RSSI levels are equally common.
#[derive(Debug, Default)]
pub struct Mode {
    counts: BTreeMap<OrdF64, u64>,
}

impl Mode {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregate for Mode {
    fn begin_run(&mut self, _this_run: usize) {}

    fn map(&mut self, sample: &Sample) {
        *self.counts.entry(OrdF64(sample.value)).or_insert(0) += 1;
    }

    fn reduce(&self) -> Option<f64> {
        let mut best: Option<(f64, u64)> = None;
        // Ascending key order; >= prefers the larger value on a tie.
        for (value, count) in &self.counts {
            match best {
                Some((_, best_count)) if *count < best_count => {}
                _ => best = Some((value.0, *count)),
            }
        }
        best.map(|(value, _)| value)
    }

    fn reset(&mut self) {
        self.counts.clear();
    }
}

/// Median value; an even-sized window yields the mean of the two middles.
#[derive(Debug, Default)]
pub struct Median {
    values: Vec<f64>,
}

impl Median {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregate for Median {
    fn begin_run(&mut self, _this_run: usize) {}

    fn map(&mut self, sample: &Sample) {
        self.values.push(sample.value);
    }

    fn reduce(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            Some(sorted[mid])
        } else {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        }
    }

    fn reset(&mut self) {
        self.values.clear();
    }
}

/// Fitted normal distribution, single-pass (Welford); `reduce` yields the
/// mean. Kept single-pass deliberately alongside the two-pass `Variance`.
#[derive(Debug, Default)]
pub struct Gaussian {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Gaussian {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variance of the fitted distribution, if two or more samples were seen.
    pub fn variance(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some(self.m2 / (self.count - 1) as f64)
    }
}

impl Aggregate for Gaussian {
    fn begin_run(&mut self, _this_run: usize) {}

    fn map(&mut self, sample: &Sample) {
        self.count += 1;
        let delta = sample.value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (sample.value - self.mean);
    }

    fn reduce(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.mean)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::testutil::rssi;

    fn feed(agg: &mut dyn Aggregate, values: &[f64]) {
        for run in 1..=agg.runs() {
            agg.begin_run(run);
            for (i, v) in values.iter().enumerate() {
                agg.map(&rssi(i as i64, *v));
            }
        }
    }

    #[test]
    fn test_mean_empty_is_none() {
        let mean = Mean::new();
        assert_eq!(mean.reduce(), None);
    }

    #[test]
    fn test_mean_and_two_pass_variance() {
        let values = [1.0, 1.0, 1.0, 1.0, 3.0];
        let mut mean = Mean::new();
        let mut variance = Variance::new();
        feed(&mut mean, &values);
        feed(&mut variance, &values);
        assert!((mean.reduce().unwrap() - 1.4).abs() < 1e-12);
        // Sample variance: (4 * 0.4^2 + 1.6^2) / 4 = 0.8
        assert!((variance.reduce().unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_variance_needs_two_samples() {
        let mut variance = Variance::new();
        feed(&mut variance, &[5.0]);
        assert_eq!(variance.reduce(), None);
    }

    #[test]
    fn test_mode_tie_breaks_to_larger_value() {
        let mut mode = Mode::new();
        feed(&mut mode, &[-60.0, -60.0, -50.0, -50.0, -70.0]);
        assert_eq!(mode.reduce(), Some(-50.0));
    }

    #[test]
    fn test_median_odd_and_even() {
        let mut median = Median::new();
        feed(&mut median, &[-60.0, -50.0, -70.0]);
        assert_eq!(median.reduce(), Some(-60.0));

        median.reset();
        feed(&mut median, &[-60.0, -50.0, -70.0, -40.0]);
        assert_eq!(median.reduce(), Some(-55.0));
    }

    #[test]
    fn test_gaussian_matches_two_pass_variance() {
        let values = [1.0, 1.0, 1.0, 1.0, 3.0];
        let mut gaussian = Gaussian::new();
        feed(&mut gaussian, &values);
        assert!((gaussian.reduce().unwrap() - 1.4).abs() < 1e-12);
        assert!((gaussian.variance().unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_reset_allows_reuse() {
        let mut mean = Mean::new();
        feed(&mut mean, &[2.0, 4.0]);
        assert_eq!(mean.reduce(), Some(3.0));
        mean.reset();
        assert_eq!(mean.reduce(), None);
        feed(&mut mean, &[10.0]);
        assert_eq!(mean.reduce(), Some(10.0));
    }
}
