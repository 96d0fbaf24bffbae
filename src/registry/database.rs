//! The device registry: identity resolution and attribute mutation.
//!
//! All lookups are total: they get-or-create and never fail. Identity
//! reconciliation is best-effort heuristic matching, not a security
//! boundary; the first plausible match wins.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::device::{
    Advertisement, BleDevice, DeviceState, OperatingSystem, PayloadData, PseudoAddress,
    TargetIdentifier,
};
use super::{BleDatabaseDelegate, DelegateQueue, DeviceAttribute, DeviceEvent};

#[derive(Default)]
struct Maps {
    by_identifier: HashMap<TargetIdentifier, Arc<BleDevice>>,
    by_payload: HashMap<PayloadData, Arc<BleDevice>>,
    by_pseudo: HashMap<PseudoAddress, Arc<BleDevice>>,
}

/// Registry of every tracked device, with secondary indexes by payload and
/// pseudo address for identity reconciliation.
///
/// Must be created inside a tokio runtime; delegate dispatch runs on its
/// own queue task.
pub struct BleDatabase {
    maps: RwLock<Maps>,
    queue: DelegateQueue,
}

impl BleDatabase {
    pub fn new() -> Self {
        BleDatabase { maps: RwLock::new(Maps::default()), queue: DelegateQueue::new() }
    }

    pub fn add_delegate(&self, delegate: Arc<dyn BleDatabaseDelegate>) {
        self.queue.add(delegate);
    }

    /// Wait for every already-published event to reach the delegates.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    /// Get-or-create by transport identifier.
    pub fn device(&self, identifier: &TargetIdentifier) -> Arc<BleDevice> {
        if let Some(device) = self.maps.read().unwrap().by_identifier.get(identifier) {
            return Arc::clone(device);
        }
        let device;
        {
            let mut maps = self.maps.write().unwrap();
            if let Some(existing) = maps.by_identifier.get(identifier) {
                return Arc::clone(existing);
            }
            device = Arc::new(BleDevice::new(identifier.clone()));
            maps.by_identifier.insert(identifier.clone(), Arc::clone(&device));
        }
        log::debug!("device created: {}", identifier);
        self.queue.publish(DeviceEvent::Created(Arc::clone(&device)));
        device
    }

    /// Get-or-create by transport identifier, consolidating identities via
    /// the pseudo address when the advertisement carries one. A record
    /// already known under the same pseudo address is re-bound to the new
    /// transport handle instead of duplicated.
    pub fn device_with_advertisement(
        &self,
        identifier: &TargetIdentifier,
        advertisement: &Advertisement,
    ) -> Arc<BleDevice> {
        if let Some(device) = self.maps.read().unwrap().by_identifier.get(identifier) {
            return Arc::clone(device);
        }
        let Some(pseudo) = advertisement.pseudo_address() else {
            // Malformed or absent metadata: plain creation, not an error.
            return self.device(identifier);
        };
        enum Outcome {
            Rebound(Arc<BleDevice>),
            Created(Arc<BleDevice>),
        }
        let outcome;
        {
            let mut maps = self.maps.write().unwrap();
            if let Some(existing) = maps.by_identifier.get(identifier) {
                return Arc::clone(existing);
            }
            if let Some(existing) = maps.by_pseudo.get(&pseudo).map(Arc::clone) {
                maps.by_identifier.insert(identifier.clone(), Arc::clone(&existing));
                existing.apply_identifier(identifier.clone());
                outcome = Outcome::Rebound(existing);
            } else {
                let device = Arc::new(BleDevice::new(identifier.clone()));
                // Rotating transport identifiers imply Android hardware.
                device.apply_pseudo_address(pseudo);
                device.apply_operating_system(OperatingSystem::Android);
                maps.by_identifier.insert(identifier.clone(), Arc::clone(&device));
                maps.by_pseudo.insert(pseudo, Arc::clone(&device));
                outcome = Outcome::Created(device);
            }
        }
        match outcome {
            Outcome::Rebound(device) => {
                log::debug!("device re-bound to {} via pseudo address", identifier);
                self.queue
                    .publish(DeviceEvent::Updated(Arc::clone(&device), DeviceAttribute::Identifier));
                device
            }
            Outcome::Created(device) => {
                log::debug!("device created: {} (pseudo-addressed)", identifier);
                self.queue.publish(DeviceEvent::Created(Arc::clone(&device)));
                device
            }
        }
    }

    /// Get-or-create by payload identity. A miss creates a placeholder
    /// record under a freshly generated identifier, reconciled later when a
    /// transport-level observation learns the same payload (see
    /// [`BleDatabase::set_payload`]).
    pub fn device_for_payload(&self, payload: &PayloadData) -> Arc<BleDevice> {
        if let Some(device) = self.maps.read().unwrap().by_payload.get(payload) {
            return Arc::clone(device);
        }
        let device;
        {
            let mut maps = self.maps.write().unwrap();
            if let Some(existing) = maps.by_payload.get(payload) {
                return Arc::clone(existing);
            }
            let identifier = TargetIdentifier::random();
            device = Arc::new(BleDevice::new(identifier.clone()));
            device.apply_payload(payload.clone());
            maps.by_identifier.insert(identifier, Arc::clone(&device));
            maps.by_payload.insert(payload.clone(), Arc::clone(&device));
        }
        log::debug!("placeholder device created for payload {}", payload);
        self.queue.publish(DeviceEvent::Created(Arc::clone(&device)));
        device
    }

    pub fn has_device(&self, payload: &PayloadData) -> bool {
        self.maps.read().unwrap().by_payload.contains_key(payload)
    }

    /// Every tracked record, deduplicated; several identifiers may map to
    /// one record.
    pub fn devices(&self) -> Vec<Arc<BleDevice>> {
        let maps = self.maps.read().unwrap();
        let mut seen = std::collections::HashSet::new();
        let mut devices = Vec::new();
        for device in maps.by_identifier.values() {
            if seen.insert(Arc::as_ptr(device) as usize) {
                devices.push(Arc::clone(device));
            }
        }
        devices
    }

    /// Remove every mapping to the record bound to `identifier`.
    pub fn delete(&self, identifier: &TargetIdentifier) {
        let device;
        {
            let mut maps = self.maps.write().unwrap();
            let Some(target) = maps.by_identifier.get(identifier).map(Arc::clone) else {
                return;
            };
            maps.by_identifier.retain(|_, d| !Arc::ptr_eq(d, &target));
            maps.by_payload.retain(|_, d| !Arc::ptr_eq(d, &target));
            maps.by_pseudo.retain(|_, d| !Arc::ptr_eq(d, &target));
            device = target;
        }
        log::debug!("device deleted: {}", identifier);
        self.queue.publish(DeviceEvent::Deleted(device));
    }

    /// Set the payload identity. If a payload-keyed placeholder already
    /// exists for this payload, its identifier mappings are merged into
    /// this record and the placeholder is deleted.
    pub fn set_payload(&self, device: &Arc<BleDevice>, payload: PayloadData) {
        let mut merged_placeholder = None;
        {
            let mut maps = self.maps.write().unwrap();
            if let Some(existing) = maps.by_payload.get(&payload).map(Arc::clone) {
                if !Arc::ptr_eq(&existing, device) {
                    for mapped in maps.by_identifier.values_mut() {
                        if Arc::ptr_eq(mapped, &existing) {
                            *mapped = Arc::clone(device);
                        }
                    }
                    maps.by_pseudo.retain(|_, d| !Arc::ptr_eq(d, &existing));
                    merged_placeholder = Some(existing);
                }
            }
            device.apply_payload(payload.clone());
            maps.by_payload.insert(payload, Arc::clone(device));
        }
        if let Some(placeholder) = merged_placeholder {
            log::debug!("placeholder merged into {}", device.identifier());
            self.queue.publish(DeviceEvent::Deleted(placeholder));
        }
        self.queue.publish(DeviceEvent::Updated(Arc::clone(device), DeviceAttribute::Payload));
    }

    pub fn set_rssi(&self, device: &Arc<BleDevice>, rssi: f64) {
        device.apply_rssi(rssi);
        self.queue.publish(DeviceEvent::Updated(Arc::clone(device), DeviceAttribute::Rssi));
    }

    pub fn set_tx_power(&self, device: &Arc<BleDevice>, tx_power: f64) {
        device.apply_tx_power(tx_power);
        self.queue.publish(DeviceEvent::Updated(Arc::clone(device), DeviceAttribute::TxPower));
    }

    pub fn set_operating_system(&self, device: &Arc<BleDevice>, os: OperatingSystem) {
        device.apply_operating_system(os);
        self.queue
            .publish(DeviceEvent::Updated(Arc::clone(device), DeviceAttribute::OperatingSystem));
    }

    pub fn set_state(&self, device: &Arc<BleDevice>, state: DeviceState) {
        device.apply_state(state);
        self.queue.publish(DeviceEvent::Updated(Arc::clone(device), DeviceAttribute::State));
    }
}

impl Default for BleDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::device::PSEUDO_ADDRESS_MANUFACTURER_ID;
    use std::sync::Mutex;

    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Recorder { events: Mutex::new(Vec::new()) })
        }

        fn take(&self) -> Vec<String> {
            std::mem::take(&mut self.events.lock().unwrap())
        }
    }

    impl BleDatabaseDelegate for Recorder {
        fn on_device_event(&self, event: &DeviceEvent) {
            let label = match event {
                DeviceEvent::Created(_) => "created".to_string(),
                DeviceEvent::Updated(_, attr) => format!("updated:{:?}", attr),
                DeviceEvent::Deleted(_) => "deleted".to_string(),
            };
            self.events.lock().unwrap().push(label);
        }
    }

    fn rotating_advertisement() -> Advertisement {
        Advertisement {
            manufacturer_id: Some(PSEUDO_ADDRESS_MANUFACTURER_ID),
            manufacturer_data: vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
        }
    }

    #[tokio::test]
    async fn test_get_or_create_emits_created_once() {
        let db = BleDatabase::new();
        let recorder = Recorder::new();
        db.add_delegate(recorder.clone());

        let id = TargetIdentifier("peripheral-1".into());
        let a = db.device(&id);
        let b = db.device(&id);
        assert!(Arc::ptr_eq(&a, &b));
        db.flush().await;
        assert_eq!(recorder.take(), vec!["created"]);
    }

    #[tokio::test]
    async fn test_pseudo_address_consolidates_identity() {
        let db = BleDatabase::new();
        let first = db.device_with_advertisement(
            &TargetIdentifier("rotated-1".into()),
            &rotating_advertisement(),
        );
        assert_eq!(db.devices().len(), 1);
        assert_eq!(first.operating_system(), OperatingSystem::Android);
        assert!(first.pseudo_address().is_some());

        // Same hardware, rotated transport identifier.
        let second = db.device_with_advertisement(
            &TargetIdentifier("rotated-2".into()),
            &rotating_advertisement(),
        );
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(db.devices().len(), 1);
        assert_eq!(second.identifier(), TargetIdentifier("rotated-2".into()));

        // Both identifiers still resolve to the one record.
        let via_old = db.device(&TargetIdentifier("rotated-1".into()));
        assert!(Arc::ptr_eq(&via_old, &first));
    }

    #[tokio::test]
    async fn test_malformed_metadata_falls_back_to_plain_creation() {
        let db = BleDatabase::new();
        let adv = Advertisement {
            manufacturer_id: Some(PSEUDO_ADDRESS_MANUFACTURER_ID),
            manufacturer_data: vec![0x01],
        };
        let device = db.device_with_advertisement(&TargetIdentifier("x".into()), &adv);
        assert_eq!(device.pseudo_address(), None);
        assert_eq!(device.operating_system(), OperatingSystem::Unknown);
    }

    #[tokio::test]
    async fn test_payload_placeholder_and_merge() {
        let db = BleDatabase::new();
        let recorder = Recorder::new();
        db.add_delegate(recorder.clone());

        let payload = PayloadData(vec![7, 7, 7]);
        let placeholder = db.device_for_payload(&payload);
        assert!(db.has_device(&payload));
        assert_eq!(db.devices().len(), 1);
        db.flush().await;
        assert_eq!(recorder.take(), vec!["created"]);

        // A real transport observation later learns the same payload.
        let real = db.device(&TargetIdentifier("peripheral-9".into()));
        db.set_payload(&real, payload.clone());
        db.flush().await;
        assert_eq!(recorder.take(), vec!["created", "deleted", "updated:Payload"]);

        // The placeholder is gone; its identifier now maps to the real record.
        assert_eq!(db.devices().len(), 1);
        let via_placeholder_id = db.device(&placeholder.identifier());
        assert!(Arc::ptr_eq(&via_placeholder_id, &real));
        assert!(db.has_device(&payload));
        assert!(Arc::ptr_eq(&db.device_for_payload(&payload), &real));
    }

    #[tokio::test]
    async fn test_delete_removes_every_mapping() {
        let db = BleDatabase::new();
        let recorder = Recorder::new();
        db.add_delegate(recorder.clone());

        let first = db.device_with_advertisement(
            &TargetIdentifier("rotated-1".into()),
            &rotating_advertisement(),
        );
        let _ = db.device_with_advertisement(
            &TargetIdentifier("rotated-2".into()),
            &rotating_advertisement(),
        );
        db.set_payload(&first, PayloadData(vec![1]));
        db.delete(&TargetIdentifier("rotated-1".into()));

        assert!(db.devices().is_empty());
        assert!(!db.has_device(&PayloadData(vec![1])));
        // A fresh observation under the old identifier creates a new record.
        let recreated = db.device(&TargetIdentifier("rotated-2".into()));
        assert!(!Arc::ptr_eq(&recreated, &first));

        db.flush().await;
        let events = recorder.take();
        assert_eq!(events.last().unwrap(), "created");
        assert!(events.contains(&"deleted".to_string()));
    }

    #[tokio::test]
    async fn test_attribute_mutations_emit_after_apply() {
        let db = BleDatabase::new();
        let device = db.device(&TargetIdentifier("p".into()));

        struct Checker {
            device: Arc<BleDevice>,
        }
        impl BleDatabaseDelegate for Checker {
            fn on_device_event(&self, event: &DeviceEvent) {
                // The change is visible by the time the event arrives.
                if let DeviceEvent::Updated(_, DeviceAttribute::Rssi) = event {
                    assert_eq!(self.device.rssi(), Some(-58.0));
                }
            }
        }
        db.add_delegate(Arc::new(Checker { device: Arc::clone(&device) }));

        db.set_rssi(&device, -58.0);
        db.set_tx_power(&device, 12.0);
        db.set_state(&device, DeviceState::Connected);
        db.flush().await;
        assert_eq!(device.tx_power(), Some(12.0));
        assert_eq!(device.state(), DeviceState::Connected);
    }
}
