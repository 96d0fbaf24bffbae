//! Periodic analysis sweep and derived-sample fan-out.
//!
//! The runner owns no timer: an external scheduler calls [`AnalysisRunner::run`],
//! which sweeps every device known to the `SignalIndex` and invokes the
//! provider manager for each. Within one device providers execute in
//! registration order; a provider chain that spans two kinds (RSSI ->
//! Distance -> Risk) completes over successive sweeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::analysis::provider::{AnalysisProvider, AnalysisProviderManager};
use crate::index::SignalIndex;
use crate::sample::{Sample, SampledId, SignalKind, Timestamp};

/// Subscriber for newly derived samples of one signal kind.
pub trait AnalysisDelegate: Send + Sync {
    /// The signal kind this delegate wants.
    fn output_kind(&self) -> SignalKind;

    /// Called once per newly produced sample of that kind.
    fn new_sample(&self, sampled: SampledId, sample: &Sample);
}

/// Ordered subscriber list routing each derived sample to the delegates
/// registered for its kind. Dispatch is synchronous within the sweep.
pub struct AnalysisDelegateManager {
    delegates: RwLock<Vec<Arc<dyn AnalysisDelegate>>>,
}

impl AnalysisDelegateManager {
    pub fn new() -> Self {
        AnalysisDelegateManager { delegates: RwLock::new(Vec::new()) }
    }

    pub fn add(&self, delegate: Arc<dyn AnalysisDelegate>) {
        self.delegates.write().unwrap().push(delegate);
    }

    pub fn notify(&self, kind: SignalKind, sampled: SampledId, sample: &Sample) {
        let delegates: Vec<_> = self.delegates.read().unwrap().iter().cloned().collect();
        for delegate in delegates {
            if delegate.output_kind() == kind {
                delegate.new_sample(sampled, sample);
            }
        }
    }
}

impl Default for AnalysisDelegateManager {
    fn default() -> Self {
        Self::new()
    }
}

/// An `AnalysisDelegate` keeping its own bounded per-device view of one
/// signal kind, independent of the `SignalIndex`'s storage. Suitable for
/// UI display or downstream consumers that want the recent history only.
pub struct BufferingDelegate {
    kind: SignalKind,
    views: SignalIndex,
}

impl BufferingDelegate {
    pub fn new(kind: SignalKind, capacity: usize) -> Self {
        BufferingDelegate { kind, views: SignalIndex::new(capacity) }
    }

    /// The retained samples for one device, oldest to newest.
    pub fn view(&self, sampled: SampledId) -> Vec<Sample> {
        match self.views.get(self.kind, sampled) {
            Some(buffer) => buffer.lock().unwrap().iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// The newest retained value for one device.
    pub fn latest(&self, sampled: SampledId) -> Option<f64> {
        self.views.get(self.kind, sampled)?.lock().unwrap().latest_value()
    }
}

impl AnalysisDelegate for BufferingDelegate {
    fn output_kind(&self) -> SignalKind {
        self.kind
    }

    fn new_sample(&self, sampled: SampledId, sample: &Sample) {
        self.views.push(self.kind, sampled, *sample);
    }
}

/// Accepts raw samples and drives the periodic analysis sweep.
pub struct AnalysisRunner {
    index: Arc<SignalIndex>,
    providers: Mutex<AnalysisProviderManager>,
    delegates: AnalysisDelegateManager,
    sweeping: AtomicBool,
}

impl AnalysisRunner {
    pub fn new(index: Arc<SignalIndex>) -> Self {
        AnalysisRunner {
            index,
            providers: Mutex::new(AnalysisProviderManager::new()),
            delegates: AnalysisDelegateManager::new(),
            sweeping: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> &Arc<SignalIndex> {
        &self.index
    }

    pub fn add_provider(&self, provider: Box<dyn AnalysisProvider>) {
        self.providers.lock().unwrap().add(provider);
    }

    pub fn add_delegate(&self, delegate: Arc<dyn AnalysisDelegate>) {
        self.delegates.add(delegate);
    }

    /// Push a new raw sample into the index. Derived values appear on the
    /// next sweep, not immediately.
    pub fn new_sample(&self, sampled: SampledId, kind: SignalKind, sample: Sample) {
        self.index.push(kind, sampled, sample);
    }

    /// One synchronous sweep over every known device. Not reentrant: a
    /// sweep arriving while another is in progress is skipped. Returns the
    /// number of derived samples produced.
    pub fn run(&self, now: Timestamp) -> usize {
        if self.sweeping.swap(true, Ordering::Acquire) {
            log::warn!("analysis sweep already in progress, skipping");
            return 0;
        }
        let mut produced = 0;
        {
            let mut providers = self.providers.lock().unwrap();
            for sampled in self.index.sampled_ids() {
                produced += providers.analyse(now, sampled, &self.index, &mut |kind, id, sample| {
                    self.delegates.notify(kind, id, &sample);
                });
            }
        }
        self.sweeping.store(false, Ordering::Release);
        log::debug!("analysis sweep produced {} sample(s)", produced);
        produced
    }
}
