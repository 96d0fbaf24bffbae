//! Two-level sample storage: signal kind -> device -> rolling window.
//!
//! Every `(kind, device)` pair owns an independent `SampleRingBuffer`
//! behind its own lock, so ingestion for one device never blocks readers
//! of another. Buffers are created on first push and live until the device
//! is explicitly forgotten.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use crate::buffer::SampleRingBuffer;
use crate::sample::{Sample, SampledId, SignalKind};

type DeviceBuffers = HashMap<SampledId, Arc<Mutex<SampleRingBuffer>>>;

/// Per-kind, per-device sample windows with get-or-create lookup.
pub struct SignalIndex {
    default_capacity: usize,
    kinds: RwLock<HashMap<SignalKind, DeviceBuffers>>,
}

impl SignalIndex {
    /// Uniform window capacity applied to every newly created buffer.
    pub const DEFAULT_CAPACITY: usize = 128;

    pub fn new(default_capacity: usize) -> Self {
        SignalIndex {
            default_capacity: default_capacity.max(1),
            kinds: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    /// The buffer for `(kind, id)`, created on first use.
    pub fn buffer(&self, kind: SignalKind, id: SampledId) -> Arc<Mutex<SampleRingBuffer>> {
        {
            let kinds = self.kinds.read().unwrap();
            if let Some(buffer) = kinds.get(&kind).and_then(|devices| devices.get(&id)) {
                return Arc::clone(buffer);
            }
        }
        let mut kinds = self.kinds.write().unwrap();
        let devices = kinds.entry(kind).or_default();
        Arc::clone(devices.entry(id).or_insert_with(|| {
            Arc::new(Mutex::new(SampleRingBuffer::new(self.default_capacity)))
        }))
    }

    /// The buffer for `(kind, id)` if one already exists.
    pub fn get(&self, kind: SignalKind, id: SampledId) -> Option<Arc<Mutex<SampleRingBuffer>>> {
        let kinds = self.kinds.read().unwrap();
        kinds.get(&kind).and_then(|devices| devices.get(&id)).map(Arc::clone)
    }

    /// Push one sample into the `(kind, id)` window.
    pub fn push(&self, kind: SignalKind, id: SampledId, sample: Sample) {
        let buffer = self.buffer(kind, id);
        let mut guard = buffer.lock().unwrap();
        guard.push(sample);
    }

    /// Every device id known to the index, across all kinds, deduplicated.
    pub fn sampled_ids(&self) -> Vec<SampledId> {
        let kinds = self.kinds.read().unwrap();
        let mut ids = BTreeSet::new();
        for devices in kinds.values() {
            ids.extend(devices.keys().copied());
        }
        ids.into_iter().collect()
    }

    /// Forget a device: drop its window for every signal kind.
    pub fn remove_device(&self, id: SampledId) {
        let mut kinds = self.kinds.write().unwrap();
        for devices in kinds.values_mut() {
            devices.remove(&id);
        }
    }
}

impl Default for SignalIndex {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
