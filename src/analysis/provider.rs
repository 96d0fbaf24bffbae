//! Analysis providers: input-kind to output-kind transforms.

use crate::buffer::SampleRingBuffer;
use crate::index::SignalIndex;
use crate::sample::{Sample, SampledId, SignalKind, Timestamp};

/// A transform from one signal kind's window to another's, invoked per
/// device by the sweep. Implementations may keep internal rate-limiting
/// state; that state is shared across every device the provider processes.
pub trait AnalysisProvider: Send {
    /// Signal kind this provider reads.
    fn input_kind(&self) -> SignalKind;

    /// Signal kind this provider writes.
    fn output_kind(&self) -> SignalKind;

    /// Analyse one device's input window, writing any derived sample into
    /// `output` and reporting it through `sink`. Returns `true` iff a new
    /// output sample was produced.
    fn analyse(
        &mut self,
        now: Timestamp,
        sampled: SampledId,
        input: &SampleRingBuffer,
        output: &mut SampleRingBuffer,
        sink: &mut dyn FnMut(SampledId, Sample),
    ) -> bool;
}

/// Providers in registration order, applied per device against the
/// `SignalIndex`'s buffers.
pub struct AnalysisProviderManager {
    providers: Vec<Box<dyn AnalysisProvider>>,
}

impl AnalysisProviderManager {
    pub fn new() -> Self {
        AnalysisProviderManager { providers: Vec::new() }
    }

    pub fn add(&mut self, provider: Box<dyn AnalysisProvider>) {
        if provider.input_kind() == provider.output_kind() {
            log::warn!(
                "dropping analysis provider with identical input/output kind {:?}",
                provider.input_kind()
            );
            return;
        }
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Run every applicable provider for one device, in registration order.
    /// Returns the number of new output samples produced.
    pub fn analyse(
        &mut self,
        now: Timestamp,
        sampled: SampledId,
        index: &SignalIndex,
        sink: &mut dyn FnMut(SignalKind, SampledId, Sample),
    ) -> usize {
        let mut produced = 0;
        for provider in self.providers.iter_mut() {
            let Some(input) = index.get(provider.input_kind(), sampled) else {
                continue;
            };
            let output = index.buffer(provider.output_kind(), sampled);
            let output_kind = provider.output_kind();
            let input_guard = input.lock().unwrap();
            let mut output_guard = output.lock().unwrap();
            let mut forward = |id: SampledId, sample: Sample| sink(output_kind, id, sample);
            if provider.analyse(now, sampled, &input_guard, &mut output_guard, &mut forward) {
                produced += 1;
            }
        }
        produced
    }
}

impl Default for AnalysisProviderManager {
    fn default() -> Self {
        Self::new()
    }
}
