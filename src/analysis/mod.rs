//! Analysis pipeline: pluggable per-device transforms between signal kinds.
//!
//! Raw samples land in the [`crate::index::SignalIndex`]; a periodic sweep
//! ([`runner::AnalysisRunner`]) invokes every registered
//! [`provider::AnalysisProvider`] for every known device, reading one
//! kind's window and writing derived samples into another's. Derived
//! samples fan out to [`runner::AnalysisDelegate`] subscribers.

pub mod fowler;
pub mod histogram;
pub mod provider;
pub mod risk;
pub mod runner;
pub mod self_calibrated;
pub mod smoothed_linear;

use chrono::Duration;

use crate::buffer::{SampleRingBuffer, SampleStream};
use crate::filter::{InRange, Since};
use crate::sample::{Sample, Timestamp};

/// Shared gating for the distance analysers: a minimum re-run interval, an
/// RSSI validity band, a minimum history span, and a minimum in-window
/// sample count. Rate-limit state is shared across every device the owning
/// provider processes.
pub(crate) struct AnalyserGate {
    /// Minimum time between successful runs.
    pub interval: Duration,
    /// Length of the smoothing window ending at `now`.
    pub smoothing_window: Duration,
    /// Inclusive validity band for raw values.
    pub valid_min: f64,
    pub valid_max: f64,
    /// Minimum number of valid samples inside the window.
    pub min_window_samples: usize,
    last_ran: Option<Timestamp>,
}

impl AnalyserGate {
    pub fn new(interval: Duration, smoothing_window: Duration, min_window_samples: usize) -> Self {
        AnalyserGate {
            interval,
            smoothing_window,
            valid_min: -99.0,
            valid_max: -10.0,
            min_window_samples,
            last_ran: None,
        }
    }

    /// The valid samples in the smoothing window ending at `now`, or `None`
    /// when the gate rejects this run. Rejection is not an error: it means
    /// "try again next sweep".
    pub fn window(&self, now: Timestamp, input: &SampleRingBuffer) -> Option<Vec<Sample>> {
        if let Some(last) = self.last_ran {
            if now - last < self.interval {
                return None;
            }
        }
        let valid = InRange::new(self.valid_min, self.valid_max);
        // History must cover the full smoothing window before results mean anything.
        let span_start = input.filtered(&valid).next().map(|s| s.taken)?;
        let span_end = input.iter().filtered(&valid).last().map(|s| s.taken)?;
        if span_end - span_start < self.smoothing_window {
            return None;
        }
        let since = Since(now - self.smoothing_window);
        let window = input.filtered(&since).filtered(&valid).to_view();
        if window.len() < self.min_window_samples {
            return None;
        }
        Some(window)
    }

    /// Record a successful run for rate limiting.
    pub fn mark_ran(&mut self, now: Timestamp) {
        self.last_ran = Some(now);
    }
}

/// Output samples are timestamped at the midpoint of the window they
/// summarize.
pub(crate) fn window_midpoint(window: &[Sample]) -> Option<Timestamp> {
    let first = window.first()?.taken;
    let last = window.last()?.taken;
    Some(first + (last - first) / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::testutil::{at, rssi};

    fn gate() -> AnalyserGate {
        AnalyserGate::new(Duration::seconds(4), Duration::seconds(60), 3)
    }

    fn buffer_spanning(secs: &[i64], value: f64) -> SampleRingBuffer {
        let mut buffer = SampleRingBuffer::new(32);
        for s in secs {
            buffer.push(rssi(*s, value));
        }
        buffer
    }

    #[test]
    fn test_gate_requires_history_span() {
        let gate = gate();
        let buffer = buffer_spanning(&[100, 110, 120], -60.0);
        assert!(gate.window(at(120), &buffer).is_none());

        let buffer = buffer_spanning(&[40, 80, 100, 110, 120], -60.0);
        assert!(gate.window(at(120), &buffer).is_some());
    }

    #[test]
    fn test_gate_requires_window_sample_count() {
        let gate = gate();
        // Span is long enough but only two samples fall inside the window.
        let buffer = buffer_spanning(&[0, 100, 120], -60.0);
        assert!(gate.window(at(120), &buffer).is_none());
    }

    #[test]
    fn test_gate_rejects_invalid_rssi() {
        let gate = gate();
        // In-band history, but the window samples sit outside [-99, -10].
        let mut buffer = buffer_spanning(&[40, 80], -60.0);
        buffer.push(rssi(100, -5.0));
        buffer.push(rssi(110, -5.0));
        buffer.push(rssi(120, -5.0));
        assert!(gate.window(at(120), &buffer).is_none());
    }

    #[test]
    fn test_gate_rate_limits_after_success() {
        let mut gate = gate();
        let buffer = buffer_spanning(&[40, 80, 100, 110, 120], -60.0);
        assert!(gate.window(at(120), &buffer).is_some());
        gate.mark_ran(at(120));
        assert!(gate.window(at(122), &buffer).is_none());
        assert!(gate.window(at(124), &buffer).is_some());
    }

    #[test]
    fn test_window_midpoint() {
        let window = vec![rssi(100, -60.0), rssi(110, -61.0), rssi(140, -62.0)];
        assert_eq!(window_midpoint(&window), Some(at(120)));
        assert_eq!(window_midpoint(&[]), None);
    }
}
