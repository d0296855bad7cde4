use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe relay counters.
///
/// Producer-side and consumer-side counters live on separate cache lines so
/// the two tasks do not contend when they run on different workers.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    values_sent: CachePadded<AtomicU64>,
    producer_suspensions: CachePadded<AtomicU64>,
    values_drained: CachePadded<AtomicU64>,
    consumer_suspensions: CachePadded<AtomicU64>,
}

/// Point-in-time copy of [`RelayMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub values_sent: u64,
    pub values_drained: u64,
    pub producer_suspensions: u64,
    pub consumer_suspensions: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            values_sent: self.values_sent.load(Ordering::Relaxed),
            values_drained: self.values_drained.load(Ordering::Relaxed),
            producer_suspensions: self.producer_suspensions.load(Ordering::Relaxed),
            consumer_suspensions: self.consumer_suspensions.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_sent(&self) {
        self.values_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drained(&self) {
        self.values_drained.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_producer_suspension(&self) {
        self.producer_suspensions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_consumer_suspension(&self) {
        self.consumer_suspensions.fetch_add(1, Ordering::Relaxed);
    }
}
