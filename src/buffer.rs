//! Fixed-capacity, FIFO-eviction sample windows.
//!
//! `SampleRingBuffer` is an arena-backed circular buffer: explicit `head`,
//! `len`, `capacity` with modular index arithmetic. Pushing beyond capacity
//! evicts exactly the oldest entry; enumeration is always oldest to newest.
//!
//! Iteration is lazy: [`SampleStream::filtered`] wraps an iterator in a
//! proxy that pulls from the source on demand, so filter chains compose
//! without materializing intermediate collections.

use crate::aggregate::{Aggregate, Summary};
use crate::filter::SampleFilter;
use crate::sample::{Sample, Timestamp};

/// Rolling window of samples for one `(device, signal kind)` pair.
#[derive(Debug, Clone)]
pub struct SampleRingBuffer {
    arena: Vec<Sample>,
    /// Arena index of the oldest live sample.
    head: usize,
    /// Number of live samples.
    len: usize,
    capacity: usize,
}

impl SampleRingBuffer {
    /// Create a buffer holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SampleRingBuffer {
            arena: Vec::with_capacity(capacity),
            head: 0,
            len: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a sample, evicting the oldest entry if the buffer is full.
    pub fn push(&mut self, sample: Sample) {
        if self.len == self.capacity {
            self.arena[self.head] = sample;
            self.head = (self.head + 1) % self.capacity;
            return;
        }
        let slot = (self.head + self.len) % self.capacity;
        if slot == self.arena.len() {
            self.arena.push(sample);
        } else {
            self.arena[slot] = sample;
        }
        self.len += 1;
    }

    /// The `(i + 1)`-th oldest sample, or `None` when out of range.
    pub fn get(&self, i: usize) -> Option<&Sample> {
        if i >= self.len {
            return None;
        }
        Some(&self.arena[(self.head + i) % self.capacity])
    }

    /// The newest sample.
    pub fn latest(&self) -> Option<&Sample> {
        if self.len == 0 {
            return None;
        }
        self.get(self.len - 1)
    }

    /// The newest sample's value.
    pub fn latest_value(&self) -> Option<f64> {
        self.latest().map(|s| s.value)
    }

    /// Empty the buffer in O(1); the arena is retained for reuse.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Evict from the oldest end while `taken < cutoff`.
    pub fn clear_before(&mut self, cutoff: Timestamp) {
        while self.len > 0 && self.arena[self.head].taken < cutoff {
            self.head = (self.head + 1) % self.capacity;
            self.len -= 1;
        }
        if self.len == 0 {
            self.head = 0;
        }
    }

    /// Single-pass cursor over current contents, oldest to newest.
    pub fn iter(&self) -> SampleIter<'_> {
        SampleIter { buffer: self, pos: 0 }
    }

    /// Lazily filtered view of the buffer.
    pub fn filtered<'a>(&'a self, filter: &'a dyn SampleFilter) -> Filtered<'a, SampleIter<'a>> {
        self.iter().filtered(filter)
    }

    /// Run every aggregate over the window, feeding each pass the same
    /// items. Aggregates declaring fewer passes than the maximum simply sit
    /// out the extra ones. Results come back in argument order.
    pub fn aggregate(&self, aggregates: &mut [&mut dyn Aggregate]) -> Summary {
        let max_runs = aggregates.iter().map(|a| a.runs()).max().unwrap_or(1);
        for agg in aggregates.iter_mut() {
            agg.reset();
        }
        for run in 1..=max_runs {
            for agg in aggregates.iter_mut() {
                if run <= agg.runs() {
                    agg.begin_run(run);
                }
            }
            for sample in self.iter() {
                for agg in aggregates.iter_mut() {
                    if run <= agg.runs() {
                        agg.map(sample);
                    }
                }
            }
        }
        Summary::new(aggregates.iter().map(|a| a.reduce()).collect())
    }
}

/// Forward-only cursor over a buffer's current contents.
pub struct SampleIter<'a> {
    buffer: &'a SampleRingBuffer,
    pos: usize,
}

impl<'a> Iterator for SampleIter<'a> {
    type Item = &'a Sample;

    fn next(&mut self) -> Option<&'a Sample> {
        let item = self.buffer.get(self.pos)?;
        self.pos += 1;
        Some(item)
    }
}

/// Lazy filtering proxy; pulls from the source and skips non-matching items.
pub struct Filtered<'a, I> {
    inner: I,
    filter: &'a dyn SampleFilter,
}

impl<'a, I: Iterator<Item = &'a Sample>> Iterator for Filtered<'a, I> {
    type Item = &'a Sample;

    fn next(&mut self) -> Option<&'a Sample> {
        for sample in self.inner.by_ref() {
            if self.filter.test(sample) {
                return Some(sample);
            }
        }
        None
    }
}

/// Chaining and materialization for any sample iterator.
pub trait SampleStream<'a>: Iterator<Item = &'a Sample> + Sized {
    /// Wrap this iterator in a lazy filter proxy.
    fn filtered(self, filter: &'a dyn SampleFilter) -> Filtered<'a, Self> {
        Filtered { inner: self, filter }
    }

    /// Materialize the remaining items.
    fn to_view(self) -> Vec<Sample> {
        self.copied().collect()
    }
}

impl<'a, I: Iterator<Item = &'a Sample>> SampleStream<'a> for I {}
