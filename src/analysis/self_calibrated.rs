//! Histogram-equalization self-calibrated distance model.
//!
//! Absolute RSSI is receiver-specific, but the *population* of readings one
//! receiver accumulates has a stable statistical shape over long windows.
//! This model anchors that shape against two physical priors: the closest
//! distance contacts plausibly reach (`min_distance`, assumed to cover the
//! top `within_min_fraction` of readings) and the typical contact distance
//! (`mean_distance`, anchored at the population mid percentile). Distance
//! then comes from where the current window's median lands between those
//! anchors, not from raw dBm.

use crate::aggregate::{Aggregate, Median};
use crate::analysis::histogram::RssiHistogram;
use crate::sample::Sample;

/// Self-calibrating linear model over equalization-normalized RSSI.
pub struct SelfCalibratedModel {
    /// Physical prior: closest plausible contact distance, metres.
    pub min_distance: f64,
    /// Physical prior: typical contact distance, metres.
    pub mean_distance: f64,
    /// Fraction of observations assumed taken within `min_distance`.
    pub within_min_fraction: f64,
    histogram: RssiHistogram,
    median: Median,
}

impl SelfCalibratedModel {
    pub const DEFAULT_WITHIN_MIN_FRACTION: f64 = 0.2;

    pub fn new(
        min_distance: f64,
        mean_distance: f64,
        within_min_fraction: f64,
        histogram: RssiHistogram,
    ) -> Self {
        SelfCalibratedModel {
            min_distance,
            mean_distance,
            within_min_fraction: within_min_fraction.clamp(0.0, 0.5),
            histogram,
            median: Median::new(),
        }
    }

    pub fn histogram(&self) -> &RssiHistogram {
        &self.histogram
    }

    pub fn histogram_mut(&mut self) -> &mut RssiHistogram {
        &mut self.histogram
    }

    /// The recalibrated `(intercept, coefficient)` for the current
    /// population, or `None` while the population is degenerate.
    pub fn calibration(&self) -> Option<(f64, f64)> {
        let anchor_raw = self.histogram.sample_percentile(1.0 - self.within_min_fraction)?;
        let mid_raw = self.histogram.sample_percentile(0.5)?;
        let anchor = self.histogram.normalise(anchor_raw);
        let mid = self.histogram.normalise(mid_raw);
        if (anchor - mid).abs() < f64::EPSILON {
            return None;
        }
        let coefficient = (self.mean_distance - self.min_distance) / (mid - anchor);
        let intercept = self.min_distance - coefficient * anchor;
        Some((intercept, coefficient))
    }

    /// The normalized anchor above which readings count as "within the
    /// minimum distance".
    fn anchor(&self) -> Option<f64> {
        let anchor_raw = self.histogram.sample_percentile(1.0 - self.within_min_fraction)?;
        Some(self.histogram.normalise(anchor_raw))
    }
}

impl Aggregate for SelfCalibratedModel {
    fn begin_run(&mut self, this_run: usize) {
        self.median.begin_run(this_run);
    }

    fn map(&mut self, sample: &Sample) {
        self.median.map(sample);
        self.histogram.add(sample.taken, sample.value);
    }

    fn reduce(&self) -> Option<f64> {
        let (intercept, coefficient) = self.calibration()?;
        let anchor = self.anchor()?;
        let median = self.median.reduce()?;
        let normalised = self.histogram.normalise(median);
        if normalised < -99.0 || normalised > self.histogram.max() as f64 {
            return None;
        }
        // Above the anchor means closer than the calibration range reaches;
        // clamp to the minimum-distance prior.
        if normalised >= anchor {
            return Some(self.min_distance);
        }
        let distance = intercept + coefficient * normalised;
        if distance < 0.0 {
            return None;
        }
        Some(distance)
    }

    fn reset(&mut self) {
        // The histogram is long-run calibration state and survives resets;
        // only the per-window median clears.
        self.median.reset();
    }
}
