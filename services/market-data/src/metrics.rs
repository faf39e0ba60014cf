//! Observability and metrics for the Market Data Service
//!
//! Atomic counters updated by the driver and the hub, plus a bounded
//! latency window for tick composition. Exported as a flat map for the
//! `/metrics` route.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Core metrics for the Market Data Service.
pub struct ServiceMetrics {
    // Ticks
    pub ticks_composed: AtomicU64,
    pub ticks_skipped: AtomicU64,
    pub tick_latency_us: Mutex<LatencyTracker>,

    // Segment reads
    pub segment_unavailable: AtomicU64,
    pub decode_failures: AtomicU64,
    pub empty_books: AtomicU64,

    // Delivery
    pub messages_enqueued: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub subscribers_evicted: AtomicU64,
    pub connected_subscribers: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            ticks_composed: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            tick_latency_us: Mutex::new(LatencyTracker::new(1000)),
            segment_unavailable: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            empty_books: AtomicU64::new(0),
            messages_enqueued: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            subscribers_evicted: AtomicU64::new(0),
            connected_subscribers: AtomicU64::new(0),
        }
    }

    /// Record one composed tick and how long it took.
    pub fn record_tick(&self, latency_us: u64) {
        self.ticks_composed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut tracker) = self.tick_latency_us.lock() {
            tracker.record(latency_us);
        }
    }

    /// Record ticks coalesced away because the previous one overran.
    pub fn record_ticks_skipped(&self, count: u64) {
        self.ticks_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_segment_unavailable(&self) {
        self.segment_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_book(&self) {
        self.empty_books.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self, enqueued: u64, dropped: u64) {
        self.messages_enqueued.fetch_add(enqueued, Ordering::Relaxed);
        self.messages_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.subscribers_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_connected_subscribers(&self, count: u64) {
        self.connected_subscribers.store(count, Ordering::Relaxed);
    }

    /// Export metrics as a BTreeMap for the query surface.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("ticks_composed".to_string(), self.ticks_composed.load(Ordering::Relaxed));
        m.insert("ticks_skipped".to_string(), self.ticks_skipped.load(Ordering::Relaxed));
        m.insert("segment_unavailable".to_string(), self.segment_unavailable.load(Ordering::Relaxed));
        m.insert("decode_failures".to_string(), self.decode_failures.load(Ordering::Relaxed));
        m.insert("empty_books".to_string(), self.empty_books.load(Ordering::Relaxed));
        m.insert("messages_enqueued".to_string(), self.messages_enqueued.load(Ordering::Relaxed));
        m.insert("messages_dropped".to_string(), self.messages_dropped.load(Ordering::Relaxed));
        m.insert("subscribers_evicted".to_string(), self.subscribers_evicted.load(Ordering::Relaxed));
        m.insert("connected_subscribers".to_string(), self.connected_subscribers.load(Ordering::Relaxed));

        if let Ok(tracker) = self.tick_latency_us.lock() {
            if let Some(p50) = tracker.percentile(50) {
                m.insert("tick_latency_p50_us".to_string(), p50);
            }
            if let Some(p99) = tracker.percentile(99) {
                m.insert("tick_latency_p99_us".to_string(), p99);
            }
        }
        m
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: Vec<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample, evicting the oldest once the window is full.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}
