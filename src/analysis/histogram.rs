//! Long-run RSSI histogram with histogram-equalization normalization.
//!
//! One receiver's RSSI readings occupy a hardware-specific dynamic range.
//! The histogram accumulates every reading into fixed integer buckets over
//! `[min, max]` and periodically recomputes a cumulative-distribution
//! table plus an equalization transform; normalizing a raw RSSI through
//! that transform removes the receiver-specific bias.
//!
//! Bucket counts are the engine's only persisted state: newline-delimited
//! `"rssi,count"` CSV through an injected [`SnapshotStore`], written
//! best-effort on each periodic update and reloaded at construction.
//! Corrupt or out-of-range lines are skipped without error.

use chrono::Duration;
use std::sync::Arc;

use crate::persistence::SnapshotStore;
use crate::sample::Timestamp;

/// Fixed-range integer bucket histogram of observed RSSI values.
pub struct RssiHistogram {
    min: i32,
    max: i32,
    counts: Vec<u64>,
    total: u64,
    /// Equalization transform per bucket; empty until the first update.
    transform: Vec<f64>,
    update_period: Duration,
    last_update: Option<Timestamp>,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl RssiHistogram {
    pub const DEFAULT_MIN: i32 = -100;
    pub const DEFAULT_MAX: i32 = -1;

    /// Create a histogram over `[min, max]`, reloading any snapshot the
    /// store holds. A failed or missing snapshot is not an error.
    pub fn new(
        min: i32,
        max: i32,
        update_period: Duration,
        store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let buckets = (max - min + 1) as usize;
        let mut histogram = RssiHistogram {
            min,
            max,
            counts: vec![0; buckets],
            total: 0,
            transform: Vec::new(),
            update_period,
            last_update: None,
            store,
        };
        histogram.load();
        histogram
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    fn bucket_index(&self, rssi: f64) -> usize {
        let clamped = rssi.round().clamp(self.min as f64, self.max as f64) as i32;
        (clamped - self.min) as usize
    }

    /// Record one reading; values outside `[min, max]` clamp to the edges.
    /// Every `update_period` the transform is recomputed and a snapshot is
    /// written.
    pub fn add(&mut self, taken: Timestamp, rssi: f64) {
        let idx = self.bucket_index(rssi);
        self.counts[idx] += 1;
        self.total += 1;
        match self.last_update {
            None => self.last_update = Some(taken),
            Some(last) if taken - last >= self.update_period => self.update(taken),
            Some(_) => {}
        }
    }

    /// Recompute the CDF-derived equalization transform now and snapshot
    /// the bucket counts (best-effort).
    pub fn update(&mut self, now: Timestamp) {
        self.last_update = Some(now);
        if self.total == 0 {
            self.transform.clear();
            return;
        }
        let buckets = self.counts.len() as f64;
        let mut cumulative = 0u64;
        self.transform = self
            .counts
            .iter()
            .map(|count| {
                cumulative += count;
                (buckets - 1.0) * cumulative as f64 / self.total as f64
            })
            .collect();
        self.save();
    }

    /// The raw RSSI value at cumulative fraction `p` of all observations.
    pub fn sample_percentile(&self, p: f64) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        let threshold = (p.clamp(0.0, 1.0) * self.total as f64).ceil().max(1.0) as u64;
        let mut cumulative = 0u64;
        for (i, count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= threshold {
                return Some((self.min + i as i32) as f64);
            }
        }
        Some(self.max as f64)
    }

    /// Normalize a raw RSSI into this receiver's observed dynamic range via
    /// the equalization transform. Identity until the first update.
    pub fn normalise(&self, rssi: f64) -> f64 {
        if self.transform.is_empty() {
            return rssi;
        }
        self.min as f64 + self.transform[self.bucket_index(rssi)]
    }

    /// `normalise(sample_percentile(p))`.
    pub fn normalised_percentile(&self, p: f64) -> Option<f64> {
        self.sample_percentile(p).map(|rssi| self.normalise(rssi))
    }

    fn load(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        let contents = match store.read() {
            Ok(contents) => contents,
            Err(e) => {
                log::debug!("rssi histogram snapshot unavailable: {}", e);
                return;
            }
        };
        for line in contents.lines() {
            let Some((rssi, count)) = line.split_once(',') else {
                continue;
            };
            let (Ok(rssi), Ok(count)) = (rssi.trim().parse::<i32>(), count.trim().parse::<u64>())
            else {
                continue;
            };
            if rssi < self.min || rssi > self.max {
                continue;
            }
            let index = (rssi - self.min) as usize;
            self.total -= self.counts[index];
            self.counts[index] = count;
            self.total += count;
        }
    }

    fn save(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let mut contents = String::new();
        for (i, count) in self.counts.iter().enumerate() {
            contents.push_str(&format!("{},{}\n", self.min + i as i32, count));
        }
        if let Err(e) = store.write(&contents) {
            log::debug!("rssi histogram snapshot write failed: {}", e);
        }
    }
}
