//! Dispatcher counters for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared between `submit`, the worker and readers
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Samples waiting in the queue after the last push/pop
    queue_len: AtomicUsize,
    /// Samples the sink accepted
    write_count: AtomicU64,
    /// Samples the sink rejected
    failure_count: AtomicU64,
    /// Samples lost to queue overflow
    dropped_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    pub fn inc_write_count(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Increment and return the new total
    pub fn inc_dropped_count(&self) -> u64 {
        self.dropped_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
}

impl MetricsSnapshot {
    /// Samples that reached the sink or failed there
    pub fn processed(&self) -> u64 {
        self.write_count + self.failure_count
    }
}
