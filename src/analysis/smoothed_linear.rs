//! Median-smoothed linear RSSI-to-distance model and its gated provider.

use chrono::Duration;

use crate::aggregate::{Aggregate, Median};
use crate::analysis::{window_midpoint, AnalyserGate};
use crate::buffer::SampleRingBuffer;
use crate::sample::{Sample, SampledId, SignalKind, Timestamp};

use super::provider::AnalysisProvider;

/// `distance = intercept + coefficient * median(window RSSI)`.
///
/// Default coefficients are empirically fitted constants; both are
/// overridable. A negative distance is rejected as no result.
#[derive(Debug)]
pub struct SmoothedLinearModel {
    pub intercept: f64,
    pub coefficient: f64,
    median: Median,
}

impl SmoothedLinearModel {
    pub const DEFAULT_INTERCEPT: f64 = -17.7275;
    pub const DEFAULT_COEFFICIENT: f64 = -0.2754;

    pub fn new(intercept: f64, coefficient: f64) -> Self {
        SmoothedLinearModel { intercept, coefficient, median: Median::new() }
    }

    /// The median of the mapped window, before the linear transform.
    pub fn median(&self) -> Option<f64> {
        self.median.reduce()
    }
}

impl Default for SmoothedLinearModel {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERCEPT, Self::DEFAULT_COEFFICIENT)
    }
}

impl Aggregate for SmoothedLinearModel {
    fn begin_run(&mut self, this_run: usize) {
        self.median.begin_run(this_run);
    }

    fn map(&mut self, sample: &Sample) {
        self.median.map(sample);
    }

    fn reduce(&self) -> Option<f64> {
        let median = self.median.reduce()?;
        let distance = self.intercept + self.coefficient * median;
        if distance < 0.0 {
            return None;
        }
        Some(distance)
    }

    fn reset(&mut self) {
        self.median.reset();
    }
}

/// Provider wrapper: gates on re-run interval, RSSI validity, history span
/// and in-window sample count before running the model over the window.
/// Gate state is shared across all devices this analyser processes.
pub struct SmoothedLinearModelAnalyser {
    gate: AnalyserGate,
    model: SmoothedLinearModel,
}

impl SmoothedLinearModelAnalyser {
    pub const DEFAULT_INTERVAL_SECS: i64 = 4;
    pub const DEFAULT_SMOOTHING_WINDOW_SECS: i64 = 60;
    pub const DEFAULT_MIN_WINDOW_SAMPLES: usize = 5;

    pub fn new(interval: Duration, smoothing_window: Duration, model: SmoothedLinearModel) -> Self {
        SmoothedLinearModelAnalyser {
            gate: AnalyserGate::new(interval, smoothing_window, Self::DEFAULT_MIN_WINDOW_SAMPLES),
            model,
        }
    }
}

impl Default for SmoothedLinearModelAnalyser {
    fn default() -> Self {
        Self::new(
            Duration::seconds(Self::DEFAULT_INTERVAL_SECS),
            Duration::seconds(Self::DEFAULT_SMOOTHING_WINDOW_SECS),
            SmoothedLinearModel::default(),
        )
    }
}

impl AnalysisProvider for SmoothedLinearModelAnalyser {
    fn input_kind(&self) -> SignalKind {
        SignalKind::Rssi
    }

    fn output_kind(&self) -> SignalKind {
        SignalKind::Distance
    }

    fn analyse(
        &mut self,
        now: Timestamp,
        sampled: SampledId,
        input: &SampleRingBuffer,
        output: &mut SampleRingBuffer,
        sink: &mut dyn FnMut(SampledId, Sample),
    ) -> bool {
        let Some(window) = self.gate.window(now, input) else {
            return false;
        };
        self.model.reset();
        for run in 1..=self.model.runs() {
            self.model.begin_run(run);
            for sample in &window {
                self.model.map(sample);
            }
        }
        let Some(distance) = self.model.reduce() else {
            return false;
        };
        let Some(taken) = window_midpoint(&window) else {
            return false;
        };
        let sample = Sample::new(taken, distance);
        output.push(sample);
        sink(sampled, sample);
        self.gate.mark_ran(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::testutil::{at, rssi};

    fn feed(model: &mut SmoothedLinearModel, values: &[f64]) {
        model.reset();
        model.begin_run(1);
        for (i, v) in values.iter().enumerate() {
            model.map(&rssi(i as i64, *v));
        }
    }

    #[test]
    fn test_constant_window_is_exact_linear() {
        let mut model = SmoothedLinearModel::default();
        feed(&mut model, &[-80.0; 7]);
        let expected = SmoothedLinearModel::DEFAULT_INTERCEPT
            + SmoothedLinearModel::DEFAULT_COEFFICIENT * -80.0;
        assert!((model.reduce().unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_negative_distance_is_no_result() {
        let mut model = SmoothedLinearModel::default();
        // Median -40 dBm: -17.7275 + 11.016 < 0.
        feed(&mut model, &[-40.0; 5]);
        assert_eq!(model.reduce(), None);
    }

    #[test]
    fn test_empty_window_is_no_result() {
        let model = SmoothedLinearModel::default();
        assert_eq!(model.reduce(), None);
    }

    fn populated_buffer() -> SampleRingBuffer {
        let mut buffer = SampleRingBuffer::new(32);
        for t in [0, 20, 40, 70, 80, 90, 100, 110, 120] {
            buffer.push(rssi(t, -80.0));
        }
        buffer
    }

    #[test]
    fn test_analyser_writes_midpoint_sample() {
        let mut analyser = SmoothedLinearModelAnalyser::default();
        let input = populated_buffer();
        let mut output = SampleRingBuffer::new(8);
        let mut emitted = Vec::new();
        let ran = analyser.analyse(at(120), SampledId(1), &input, &mut output, &mut |id, s| {
            emitted.push((id, s));
        });
        assert!(ran);
        assert_eq!(emitted.len(), 1);
        let sample = output.latest().unwrap();
        // Window is [60, 120]; in-window samples span 70..=120.
        assert_eq!(sample.taken, at(95));
        let expected = SmoothedLinearModel::DEFAULT_INTERCEPT
            + SmoothedLinearModel::DEFAULT_COEFFICIENT * -80.0;
        assert!((sample.value - expected).abs() < 1e-12);
    }

    #[test]
    fn test_analyser_rate_limits_second_call() {
        let mut analyser = SmoothedLinearModelAnalyser::default();
        let mut input = populated_buffer();
        let mut output = SampleRingBuffer::new(8);
        assert!(analyser.analyse(at(120), SampledId(1), &input, &mut output, &mut |_, _| {}));
        // New data arrives, but the second call lands inside the interval.
        input.push(rssi(121, -79.0));
        assert!(!analyser.analyse(at(122), SampledId(1), &input, &mut output, &mut |_, _| {}));
        // After the interval elapses it runs again.
        assert!(analyser.analyse(at(125), SampledId(1), &input, &mut output, &mut |_, _| {}));
    }
}
