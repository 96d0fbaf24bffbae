//! Proximity sensing engine for BLE-class radio observations.
//!
//! Two halves make up the crate. The registry ([`registry`]) tracks peer
//! devices through rotating transport identifiers, payload reads and
//! pseudo-address consolidation, publishing change events on a serial
//! dispatch queue. The analysis side ([`index`], [`analysis`]) stores raw
//! RSSI in bounded per-device windows and derives distance and risk
//! estimates from them through pluggable providers on a periodic sweep.
//! [`ingest::SampleIngestor`] bridges the two.
//!
//! A minimal pipeline:
//!
//! ```no_run
//! use std::sync::Arc;
//! use nearfield::analysis::runner::AnalysisRunner;
//! use nearfield::analysis::smoothed_linear::SmoothedLinearModelAnalyser;
//! use nearfield::index::SignalIndex;
//! use nearfield::ingest::{SampleIngestor, SensorDelegateList};
//! use nearfield::registry::database::BleDatabase;
//!
//! # async fn pipeline() {
//! let runner = Arc::new(AnalysisRunner::new(Arc::new(SignalIndex::default())));
//! runner.add_provider(Box::new(SmoothedLinearModelAnalyser::default()));
//! let sensors = Arc::new(SensorDelegateList::new());
//! let database = BleDatabase::new();
//! database.add_delegate(Arc::new(SampleIngestor::new(runner.clone(), sensors)));
//! // ... feed discoveries into `database`, call `runner.run(Utc::now())`
//! // from a scheduler.
//! # }
//! ```

pub mod aggregate;
pub mod analysis;
pub mod buffer;
pub mod filter;
pub mod index;
pub mod ingest;
pub mod persistence;
pub mod registry;
pub mod sample;

pub use aggregate::{Aggregate, Gaussian, Mean, Median, Mode, Summary, Variance};
pub use buffer::{SampleRingBuffer, SampleStream};
pub use filter::{GreaterThan, InPeriod, InRange, LessThan, SampleFilter, Since, Until};
pub use index::SignalIndex;
pub use sample::{Sample, SampledId, SignalKind, Timestamp};
