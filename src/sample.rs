//! Core sample types: signal kinds, stream identifiers, timestamped values.
//!
//! A `Sample` is one immutable measurement; `SignalKind` says what the
//! number means (raw RSSI, derived distance, accumulated risk, ...);
//! `SampledId` names the physical device the measurement belongs to,
//! independent of whatever transport-layer identifier happened to carry it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All timestamps in the engine are UTC wall-clock times.
pub type Timestamp = DateTime<Utc>;

/// The semantic type of a measurement.
///
/// Used directly as a map key throughout the engine; every `(kind, device)`
/// pair gets its own independent rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Raw received signal strength, dBm.
    Rssi,
    /// Estimated physical distance, metres.
    Distance,
    /// Accumulated exposure risk score (dimensionless).
    Risk,
    /// Accelerometer axes, m/s².
    AccelerometerX,
    AccelerometerY,
    AccelerometerZ,
}

/// Stable key for one physical device's measurement streams.
///
/// Derived from the application-level payload identity once that is known,
/// otherwise from the transport-layer identifier. Stays stable for the
/// device's tracked lifetime even as radio addresses rotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampledId(pub u64);

impl SampledId {
    /// Derive an id by hashing arbitrary identity bytes (FNV-1a).
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in bytes {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        SampledId(hash)
    }
}

impl std::fmt::Display for SampledId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One immutable measurement: when it was taken and what was read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the measurement was taken.
    pub taken: Timestamp,
    /// The measured value; units depend on the owning buffer's `SignalKind`.
    pub value: f64,
}

impl Sample {
    pub fn new(taken: Timestamp, value: f64) -> Self {
        Sample { taken, value }
    }
}
