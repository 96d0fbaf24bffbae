//! Exposure risk as a time-integral over the distance stream.
//!
//! Between each consecutive pair of distance samples the model computes an
//! instantaneous risk slice from the newer distance (an inverse-log
//! decreasing function, clamped at short range) and weights it by the
//! elapsed time between the pair. `reduce` reports the running total.
//!
//! The accumulator is deliberately stateful across calls: feed each
//! distance sample exactly once. `begin_run` keeps the running total and
//! the carried-over last sample so accumulation bridges successive sweeps;
//! only `reset` clears them.

use crate::aggregate::Aggregate;
use crate::sample::Sample;

/// Time-integrated inverse-log risk over one device's Distance stream.
#[derive(Debug)]
pub struct RiskAggregationBasic {
    pub time_scale: f64,
    pub distance_scale: f64,
    pub minimum_distance_clamp: f64,
    pub minimum_risk_at_clamp: f64,
    pub log_scale: f64,
    last: Option<Sample>,
    total: f64,
    pairs: u64,
}

impl RiskAggregationBasic {
    pub const DEFAULT_LOG_SCALE: f64 = 3.3598856662;

    pub fn new(
        time_scale: f64,
        distance_scale: f64,
        minimum_distance_clamp: f64,
        minimum_risk_at_clamp: f64,
        log_scale: f64,
    ) -> Self {
        RiskAggregationBasic {
            time_scale,
            distance_scale,
            minimum_distance_clamp,
            minimum_risk_at_clamp,
            log_scale,
            last: None,
            total: 0.0,
            pairs: 0,
        }
    }

    /// Risk per unit time at one scaled distance.
    fn risk_slice(&self, distance: f64) -> f64 {
        let scaled = distance * self.distance_scale;
        if scaled > self.minimum_distance_clamp {
            (self.minimum_risk_at_clamp - self.log_scale * scaled.log10())
                .clamp(0.0, self.minimum_risk_at_clamp)
        } else {
            self.minimum_risk_at_clamp
        }
    }
}

impl Default for RiskAggregationBasic {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0, 1.0, Self::DEFAULT_LOG_SCALE)
    }
}

impl Aggregate for RiskAggregationBasic {
    fn begin_run(&mut self, _this_run: usize) {}

    fn map(&mut self, sample: &Sample) {
        if let Some(last) = self.last {
            let elapsed = (sample.taken - last.taken).num_milliseconds() as f64 / 1000.0;
            if elapsed > 0.0 {
                self.total += self.risk_slice(sample.value) * self.time_scale * elapsed;
                self.pairs += 1;
            }
        }
        self.last = Some(*sample);
    }

    fn reduce(&self) -> Option<f64> {
        if self.pairs == 0 {
            return None;
        }
        Some(self.total)
    }

    fn reset(&mut self) {
        self.last = None;
        self.total = 0.0;
        self.pairs = 0;
    }
}
