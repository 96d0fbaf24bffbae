//! Log-linear (Fowler) RSSI-to-distance model and its gated provider.

use chrono::Duration;

use crate::aggregate::{Aggregate, Mode};
use crate::analysis::{window_midpoint, AnalyserGate};
use crate::buffer::SampleRingBuffer;
use crate::sample::{Sample, SampledId, SignalKind, Timestamp};

use super::provider::AnalysisProvider;

/// `distance = 10 ^ ((mode(window RSSI) - intercept) / coefficient)`.
#[derive(Debug)]
pub struct FowlerBasic {
    pub intercept: f64,
    pub coefficient: f64,
    mode: Mode,
}

impl FowlerBasic {
    pub const DEFAULT_INTERCEPT: f64 = -11.0;
    pub const DEFAULT_COEFFICIENT: f64 = -0.4;

    pub fn new(intercept: f64, coefficient: f64) -> Self {
        FowlerBasic { intercept, coefficient, mode: Mode::new() }
    }
}

impl Default for FowlerBasic {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERCEPT, Self::DEFAULT_COEFFICIENT)
    }
}

impl Aggregate for FowlerBasic {
    fn begin_run(&mut self, this_run: usize) {
        self.mode.begin_run(this_run);
    }

    fn map(&mut self, sample: &Sample) {
        self.mode.map(sample);
    }

    fn reduce(&self) -> Option<f64> {
        if self.coefficient == 0.0 {
            return None;
        }
        let mode = self.mode.reduce()?;
        let exponent = (mode - self.intercept) / self.coefficient;
        Some(10f64.powf(exponent))
    }

    fn reset(&mut self) {
        self.mode.reset();
    }
}

/// Provider wrapper with the same gating as the smoothed linear analyser.
/// Gate state is shared across all devices this analyser processes.
pub struct FowlerBasicAnalyser {
    gate: AnalyserGate,
    model: FowlerBasic,
}

impl FowlerBasicAnalyser {
    pub const DEFAULT_INTERVAL_SECS: i64 = 10;

    pub fn new(interval: Duration, smoothing_window: Duration, model: FowlerBasic) -> Self {
        FowlerBasicAnalyser {
            gate: AnalyserGate::new(interval, smoothing_window, 5),
            model,
        }
    }
}

impl Default for FowlerBasicAnalyser {
    fn default() -> Self {
        Self::new(
            Duration::seconds(Self::DEFAULT_INTERVAL_SECS),
            Duration::seconds(60),
            FowlerBasic::default(),
        )
    }
}

impl AnalysisProvider for FowlerBasicAnalyser {
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
