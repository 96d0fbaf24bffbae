//! Device records and the identity types attached to them.
//!
//! A `BleDevice` is born on first discovery and accumulates attributes as
//! fragmentary observations arrive: a payload once read, RSSI on every
//! advertisement, an operating system inferred from advertisement shape, a
//! pseudo address on rotating-identifier hardware. The registry owns every
//! record; external code holds `Arc<BleDevice>` for reading only, and all
//! mutation goes through [`crate::registry::database::BleDatabase`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;

use crate::sample::{SampledId, Timestamp};

/// Transport-layer identifier for one radio peer. Platforms may rotate
/// these; identity reconciliation is the registry's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetIdentifier(pub String);

impl TargetIdentifier {
    /// Freshly generated identifier for placeholder devices.
    pub fn random() -> Self {
        TargetIdentifier(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for TargetIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application-level payload identity read from a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadData(pub Vec<u8>);

impl std::fmt::Display for PayloadData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0.iter().take(8) {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Stable secondary address embedded in advertisement metadata by hardware
/// that rotates its transport identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PseudoAddress(pub u64);

/// Manufacturer id marking advertisements that carry a pseudo address.
pub const PSEUDO_ADDRESS_MANUFACTURER_ID: u16 = 65530;

/// Advertisement metadata observed alongside a discovery event.
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    pub manufacturer_id: Option<u16>,
    pub manufacturer_data: Vec<u8>,
}

impl Advertisement {
    /// Extract the embedded pseudo address, if the metadata carries one.
    /// Malformed metadata simply yields `None`, never an error.
    pub fn pseudo_address(&self) -> Option<PseudoAddress> {
        if self.manufacturer_id != Some(PSEUDO_ADDRESS_MANUFACTURER_ID) {
            return None;
        }
        if self.manufacturer_data.len() < 6 {
            return None;
        }
        let mut address: u64 = 0;
        for byte in &self.manufacturer_data[..6] {
            address = (address << 8) | u64::from(*byte);
        }
        Some(PseudoAddress(address))
    }
}

/// Operating system inferred for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingSystem {
    Android,
    Ios,
    Unknown,
    /// Identified as not participating; skip further work.
    Ignore,
}

/// Connection lifecycle state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
struct DeviceInner {
    identifier: TargetIdentifier,
    last_updated_at: Timestamp,
    payload: Option<PayloadData>,
    rssi: Option<f64>,
    tx_power: Option<f64>,
    operating_system: OperatingSystem,
    pseudo_address: Option<PseudoAddress>,
    state: DeviceState,
    last_connected_at: Option<Timestamp>,
    last_disconnected_at: Option<Timestamp>,
}

/// One tracked peer. Mutation is registry-internal; every setter bumps
/// `last_updated_at` and yields a change event for the delegate queue.
#[derive(Debug)]
pub struct BleDevice {
    created_at: Timestamp,
    inner: RwLock<DeviceInner>,
}

impl BleDevice {
    pub(crate) fn new(identifier: TargetIdentifier) -> Self {
        let now = Utc::now();
        BleDevice {
            created_at: now,
            inner: RwLock::new(DeviceInner {
                identifier,
                last_updated_at: now,
                payload: None,
                rssi: None,
                tx_power: None,
                operating_system: OperatingSystem::Unknown,
                pseudo_address: None,
                state: DeviceState::Disconnected,
                last_connected_at: None,
                last_disconnected_at: None,
            }),
        }
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// The transport identifier the record is currently bound to.
    pub fn identifier(&self) -> TargetIdentifier {
        self.inner.read().unwrap().identifier.clone()
    }

    pub fn last_updated_at(&self) -> Timestamp {
        self.inner.read().unwrap().last_updated_at
    }

    pub fn payload(&self) -> Option<PayloadData> {
        self.inner.read().unwrap().payload.clone()
    }

    pub fn rssi(&self) -> Option<f64> {
        self.inner.read().unwrap().rssi
    }

    pub fn tx_power(&self) -> Option<f64> {
        self.inner.read().unwrap().tx_power
    }

    pub fn operating_system(&self) -> OperatingSystem {
        self.inner.read().unwrap().operating_system
    }

    pub fn pseudo_address(&self) -> Option<PseudoAddress> {
        self.inner.read().unwrap().pseudo_address
    }

    pub fn state(&self) -> DeviceState {
        self.inner.read().unwrap().state
    }

    pub fn last_connected_at(&self) -> Option<Timestamp> {
        self.inner.read().unwrap().last_connected_at
    }

    pub fn last_disconnected_at(&self) -> Option<Timestamp> {
        self.inner.read().unwrap().last_disconnected_at
    }

    /// Stable measurement-stream key: payload identity once known,
    /// otherwise the transport identifier.
    pub fn sampled_id(&self) -> SampledId {
        let inner = self.inner.read().unwrap();
        match &inner.payload {
            Some(payload) => SampledId::of_bytes(&payload.0),
            None => SampledId::of_bytes(inner.identifier.0.as_bytes()),
        }
    }

    fn touch(inner: &mut DeviceInner) {
        inner.last_updated_at = Utc::now();
    }

    pub(crate) fn apply_identifier(&self, identifier: TargetIdentifier) {
        let mut inner = self.inner.write().unwrap();
        inner.identifier = identifier;
        Self::touch(&mut inner);
    }

    pub(crate) fn apply_payload(&self, payload: PayloadData) {
        let mut inner = self.inner.write().unwrap();
        inner.payload = Some(payload);
        Self::touch(&mut inner);
    }

    pub(crate) fn apply_rssi(&self, rssi: f64) {
        let mut inner = self.inner.write().unwrap();
        inner.rssi = Some(rssi);
        Self::touch(&mut inner);
    }

    pub(crate) fn apply_tx_power(&self, tx_power: f64) {
        let mut inner = self.inner.write().unwrap();
        inner.tx_power = Some(tx_power);
        Self::touch(&mut inner);
    }

    pub(crate) fn apply_operating_system(&self, operating_system: OperatingSystem) {
        let mut inner = self.inner.write().unwrap();
        inner.operating_system = operating_system;
        Self::touch(&mut inner);
    }

    pub(crate) fn apply_pseudo_address(&self, pseudo_address: PseudoAddress) {
        let mut inner = self.inner.write().unwrap();
        inner.pseudo_address = Some(pseudo_address);
        Self::touch(&mut inner);
    }

    pub(crate) fn apply_state(&self, state: DeviceState) {
        let mut inner = self.inner.write().unwrap();
        inner.state = state;
        let now = Utc::now();
        match state {
            DeviceState::Connected => inner.last_connected_at = Some(now),
            DeviceState::Disconnected => inner.last_disconnected_at = Some(now),
            DeviceState::Connecting => {}
        }
        inner.last_updated_at = now;
    }
}
