//! End-to-end proximity pipeline test
//!
//! Drives the full path: discovery with identifier rotation lands records
//! in the registry, the ingestor bridges RSSI observations into the
//! analysis index, and successive sweeps derive distance then accumulated
//! risk, fanning results out to a buffering subscriber.
//!
//! Run with:
//!   cargo test --test proximity_pipeline

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};

use nearfield::aggregate::Aggregate;
use nearfield::analysis::provider::AnalysisProvider;
use nearfield::analysis::risk::RiskAggregationBasic;
use nearfield::analysis::runner::{AnalysisRunner, BufferingDelegate};
use nearfield::analysis::smoothed_linear::SmoothedLinearModel;
use nearfield::analysis::smoothed_linear::SmoothedLinearModelAnalyser;
use nearfield::buffer::SampleRingBuffer;
use nearfield::index::SignalIndex;
use nearfield::ingest::{SampleIngestor, SensorDelegate, SensorDelegateList, SensorEvent};
use nearfield::registry::database::BleDatabase;
use nearfield::registry::device::{
    Advertisement, PayloadData, TargetIdentifier, PSEUDO_ADDRESS_MANUFACTURER_ID,
};
use nearfield::{Sample, SampledId, SignalKind, Timestamp};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn sample(secs: i64, value: f64) -> Sample {
    Sample::new(at(secs), value)
}

/// Distance -> Risk chaining provider: feeds each distance sample into the
/// running accumulator exactly once and emits the running total.
struct RiskChain {
    model: RiskAggregationBasic,
    fed_through: Option<Timestamp>,
}

impl RiskChain {
    fn new() -> Self {
        RiskChain { model: RiskAggregationBasic::default(), fed_through: None }
    }
}

impl AnalysisProvider for RiskChain {
    fn input_kind(&self) -> SignalKind {
        SignalKind::Distance
    }

    fn output_kind(&self) -> SignalKind {
        SignalKind::Risk
    }

    fn analyse(
        &mut self,
        now: Timestamp,
        sampled: SampledId,
        input: &SampleRingBuffer,
        output: &mut SampleRingBuffer,
        sink: &mut dyn FnMut(SampledId, Sample),
    ) -> bool {
        let mut newest = self.fed_through;
        self.model.begin_run(1);
        for distance in input.iter() {
            if self.fed_through.is_some_and(|t| distance.taken <= t) {
                continue;
            }
            self.model.map(distance);
            newest = Some(distance.taken);
        }
        if newest == self.fed_through {
            return false;
        }
        self.fed_through = newest;
        let Some(total) = self.model.reduce() else {
            return false;
        };
        let out = Sample::new(now, total);
        output.push(out);
        sink(sampled, out);
        true
    }
}

struct SensorLog {
    events: Mutex<Vec<String>>,
}

impl SensorDelegate for SensorLog {
    fn on_sensor_event(&self, event: &SensorEvent) {
        let label = match event {
            SensorEvent::DidDetect(_) => "detect".to_string(),
            SensorEvent::DidMeasure { proximity, .. } => format!("measure:{}", proximity.value),
            SensorEvent::DidRead { payload, .. } => format!("read:{}", payload),
            SensorEvent::DidUpdateState { .. } => "state".to_string(),
        };
        self.events.lock().unwrap().push(label);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Successive sweeps chain RSSI -> Distance -> Risk; the first sweep seeds
/// the risk accumulator, the second produces a positive time-integrated
/// total, and the buffering subscriber retains the distance history.
#[test]
fn test_sweeps_derive_distance_then_risk() {
    init_logging();
    let runner = AnalysisRunner::new(Arc::new(SignalIndex::new(64)));
    runner.add_provider(Box::new(SmoothedLinearModelAnalyser::default()));
    runner.add_provider(Box::new(RiskChain::new()));
    let distances = Arc::new(BufferingDelegate::new(SignalKind::Distance, 16));
    runner.add_delegate(distances.clone());

    // Two minutes of steady -70 dBm observations, one every ten seconds.
    let id = SampledId(42);
    for t in (0i64..=120).step_by(10) {
        runner.new_sample(id, SignalKind::Rssi, sample(t, -70.0));
    }

    let expected_distance =
        SmoothedLinearModel::DEFAULT_INTERCEPT + SmoothedLinearModel::DEFAULT_COEFFICIENT * -70.0;

    // Sweep 1: distance appears; a single distance sample is not yet a
    // risk interval.
    assert_eq!(runner.run(at(120)), 1);
    let first = distances.view(id);
    assert_eq!(first.len(), 1);
    // Smoothing window [60, 120] midpoint.
    assert_eq!(first[0].taken, at(90));
    assert!((first[0].value - expected_distance).abs() < 1e-9);
    let risk = runner.index().get(SignalKind::Risk, id).unwrap();
    assert_eq!(risk.lock().unwrap().len(), 0);

    // Sweep 2, past the rate-limit interval: a second distance sample at
    // the new window midpoint completes the first risk interval.
    assert_eq!(runner.run(at(125)), 2);
    let second = distances.view(id);
    assert_eq!(second.len(), 2);
    assert_eq!(second[1].taken, at(95));

    let slice = (1.0 - RiskAggregationBasic::DEFAULT_LOG_SCALE * expected_distance.log10())
        .clamp(0.0, 1.0);
    assert!(slice > 0.0);
    let risk = runner.index().get(SignalKind::Risk, id).unwrap();
    let total = risk.lock().unwrap().latest_value().unwrap();
    // Five seconds between the two distance midpoints.
    assert!((total - slice * 5.0).abs() < 1e-9);
}

/// Identifier rotation mid-stream: the pseudo address re-binds the record,
/// so RSSI observed under the new transport handle lands in the same
/// payload-keyed measurement stream.
#[tokio::test]
async fn test_rotating_identifier_keeps_one_measurement_stream() {
    init_logging();
    let runner = Arc::new(AnalysisRunner::new(Arc::new(SignalIndex::new(64))));
    let sensors = Arc::new(SensorDelegateList::new());
    let log = Arc::new(SensorLog { events: Mutex::new(Vec::new()) });
    sensors.add(log.clone());
    let database = BleDatabase::new();
    database.add_delegate(Arc::new(SampleIngestor::new(runner.clone(), sensors)));

    let advertisement = Advertisement {
        manufacturer_id: Some(PSEUDO_ADDRESS_MANUFACTURER_ID),
        manufacturer_data: vec![0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F],
    };
    let device = database.device_with_advertisement(&TargetIdentifier("mac-1".into()), &advertisement);
    database.set_payload(&device, PayloadData(vec![0xC0, 0xFF, 0xEE]));
    database.set_rssi(&device, -67.0);
    // Attribute reads happen at dispatch time; drain before the next
    // observation so each measurement event sees its own value.
    database.flush().await;

    // The platform rotates the transport identifier; the advertisement's
    // pseudo address reconciles it to the same record.
    let rotated = database.device_with_advertisement(&TargetIdentifier("mac-2".into()), &advertisement);
    database.set_rssi(&rotated, -69.0);
    database.flush().await;

    assert_eq!(database.devices().len(), 1);
    assert_eq!(rotated.sampled_id(), device.sampled_id());

    let ids = runner.index().sampled_ids();
    assert_eq!(ids, vec![device.sampled_id()]);
    let buffer = runner.index().get(SignalKind::Rssi, device.sampled_id()).unwrap();
    let values: Vec<f64> = buffer.lock().unwrap().iter().map(|s| s.value).collect();
    assert_eq!(values, vec![-67.0, -69.0]);

    let events = log.events.lock().unwrap();
    assert_eq!(
        *events,
        vec!["detect", "read:c0ffee", "measure:-67", "measure:-69"]
    );
}

/// Deleting a device forgets both the registry record and every derived
/// measurement stream.
#[tokio::test]
async fn test_delete_clears_registry_and_streams() {
    init_logging();
    let runner = Arc::new(AnalysisRunner::new(Arc::new(SignalIndex::new(64))));
    let sensors = Arc::new(SensorDelegateList::new());
    let database = BleDatabase::new();
    database.add_delegate(Arc::new(SampleIngestor::new(runner.clone(), sensors)));

    let device = database.device(&TargetIdentifier("mac-1".into()));
    database.set_payload(&device, PayloadData(vec![1, 2, 3]));
    database.set_rssi(&device, -60.0);
    database.flush().await;
    assert_eq!(runner.index().sampled_ids().len(), 1);

    database.delete(&TargetIdentifier("mac-1".into()));
    database.flush().await;
    assert!(database.devices().is_empty());
    assert!(runner.index().sampled_ids().is_empty());
}
