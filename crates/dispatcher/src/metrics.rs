//! Per-sink counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::CaptureEvent;

/// Counters for a single sink, shared between its handle and worker
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Approximate queue length
    queue_len: AtomicUsize,
    /// Events written successfully
    events_written: AtomicU64,
    /// Of which were capture records
    records_written: AtomicU64,
    /// Events the sink failed to write
    failure_count: AtomicU64,
    /// Events dropped because the queue was full
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

    pub fn events_written(&self) -> u64 {
        self.events_written.load(Ordering::Relaxed)
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn on_written(&self, sink_name: &str, event: &CaptureEvent) {
        self.events_written.fetch_add(1, Ordering::Relaxed);
        if matches!(event, CaptureEvent::Record(_)) {
            self.records_written.fetch_add(1, Ordering::Relaxed);
        }
        observability::metrics::record_event_dispatched(sink_name, true);
    }

    pub fn on_failed(&self, sink_name: &str) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        observability::metrics::record_event_dispatched(sink_name, false);
    }

    pub fn on_dropped(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            events_written: self.events_written(),
            records_written: self.records_written(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Point-in-time copy of [`SinkMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub events_written: u64,
    pub records_written: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
}
