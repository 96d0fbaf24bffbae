//! Sensor event fan-out and the registry-to-analysis bridge.
//!
//! Registry change events are converted here into the two outward-facing
//! streams: high-level sensor events (`did_detect`, `did_measure`,
//! `did_read`, `did_update_state`) for application subscribers, and raw
//! RSSI samples pushed into the analysis runner for devices whose payload
//! identity is known.

use std::sync::{Arc, RwLock};

use crate::analysis::runner::AnalysisRunner;
use crate::registry::device::{DeviceState, PayloadData, TargetIdentifier};
use crate::registry::{BleDatabaseDelegate, DeviceAttribute, DeviceEvent};
use crate::sample::{Sample, SignalKind};

/// How a proximity figure was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityUnit {
    Rssi,
    TxPower,
}

/// One proximity estimate attached to a measurement event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    pub unit: ProximityUnit,
    pub value: f64,
}

/// High-level sensing notifications for application subscribers.
#[derive(Debug, Clone)]
pub enum SensorEvent {
    /// A device was detected for the first time.
    DidDetect(TargetIdentifier),
    /// A proximity measurement was taken for a device.
    DidMeasure {
        proximity: Proximity,
        target: TargetIdentifier,
        payload: Option<PayloadData>,
    },
    /// A payload was read from a device.
    DidRead {
        payload: PayloadData,
        target: TargetIdentifier,
    },
    /// A device's connection state changed.
    DidUpdateState {
        state: DeviceState,
        target: TargetIdentifier,
    },
}

/// Subscriber to sensor events.
pub trait SensorDelegate: Send + Sync {
    fn on_sensor_event(&self, event: &SensorEvent);
}

/// Ordered subscriber list with synchronous fan-out.
pub struct SensorDelegateList {
    delegates: RwLock<Vec<Arc<dyn SensorDelegate>>>,
}

impl SensorDelegateList {
    pub fn new() -> Self {
        SensorDelegateList { delegates: RwLock::new(Vec::new()) }
    }

    pub fn add(&self, delegate: Arc<dyn SensorDelegate>) {
        self.delegates.write().unwrap().push(delegate);
    }

    pub fn publish(&self, event: &SensorEvent) {
        let delegates: Vec<_> = self.delegates.read().unwrap().iter().cloned().collect();
        for delegate in delegates {
            delegate.on_sensor_event(event);
        }
    }
}

impl Default for SensorDelegateList {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry delegate converting attribute changes into sensor events and
/// analysis samples. Registered with the `BleDatabase`; runs on its
/// dispatch queue. Attribute values are read from the record at dispatch
/// time, so updates arriving faster than dispatch coalesce to the newest
/// value.
pub struct SampleIngestor {
    runner: Arc<AnalysisRunner>,
    sensors: Arc<SensorDelegateList>,
}

impl SampleIngestor {
    pub fn new(runner: Arc<AnalysisRunner>, sensors: Arc<SensorDelegateList>) -> Self {
        SampleIngestor { runner, sensors }
    }
}

impl BleDatabaseDelegate for SampleIngestor {
    fn on_device_event(&self, event: &DeviceEvent) {
        match event {
            DeviceEvent::Created(device) => {
                self.sensors.publish(&SensorEvent::DidDetect(device.identifier()));
            }
            DeviceEvent::Updated(device, DeviceAttribute::Rssi) => {
                let Some(rssi) = device.rssi() else {
                    return;
                };
                let payload = device.payload();
                self.sensors.publish(&SensorEvent::DidMeasure {
                    proximity: Proximity { unit: ProximityUnit::Rssi, value: rssi },
                    target: device.identifier(),
                    payload: payload.clone(),
                });
                // Only payload-identified devices feed the analysis pipeline;
                // a transport-keyed stream would fragment on rotation.
                if payload.is_some() {
                    self.runner.new_sample(
                        device.sampled_id(),
                        SignalKind::Rssi,
                        Sample::new(device.last_updated_at(), rssi),
                    );
                }
            }
            DeviceEvent::Updated(device, DeviceAttribute::Payload) => {
                let Some(payload) = device.payload() else {
                    return;
                };
                self.sensors.publish(&SensorEvent::DidRead {
                    payload,
                    target: device.identifier(),
                });
            }
            DeviceEvent::Updated(device, DeviceAttribute::State) => {
                self.sensors.publish(&SensorEvent::DidUpdateState {
                    state: device.state(),
                    target: device.identifier(),
                });
            }
            DeviceEvent::Updated(_, _) => {}
            DeviceEvent::Deleted(device) => {
                // Forget the measurement streams along with the record.
                self.runner.index().remove_device(device.sampled_id());
            }
        }
    }
}
