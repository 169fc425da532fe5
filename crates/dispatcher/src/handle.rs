//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{CaptureEvent, RecordSink};

use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<CaptureEvent>,
    metrics: Arc<SinkMetrics>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker task for `sink`
    pub fn spawn<S: RecordSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue an event without waiting.
    ///
    /// Returns false if the queue was full (event dropped) or the worker is gone.
    pub fn try_send(&self, event: CaptureEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                let queued = self.tx.max_capacity() - self.tx.capacity();
                self.metrics.set_queue_len(queued);
                observability::metrics::record_queue_depth(&self.name, queued);
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.metrics.on_dropped();
                warn!(
                    sink = %self.name,
                    event = event.label(),
                    simulation_id = %event.simulation_id(),
                    "Queue full, event dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Queue an event, waiting for room.
    ///
    /// Lifecycle events go through here so a sink never misses the start or
    /// end of a simulation.
    pub async fn send(&self, event: CaptureEvent) -> bool {
        match self.tx.send(event).await {
            Ok(()) => true,
            Err(_) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Close the queue and wait for the worker to drain it
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: RecordSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<CaptureEvent>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(event) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&event).await {
            Ok(()) => metrics.on_written(&name, &event),
            Err(e) => {
                metrics.on_failed(&name);
                error!(
                    sink = %name,
                    event = event.label(),
                    simulation_id = %event.simulation_id(),
                    error = %e,
                    "Write failed"
                );
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use contracts::{
        CaptureRecord, ContractError, Metric, PendingId, RecordPayload, SimulationId,
    };
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    pub(crate) fn metric_event(step: u64) -> CaptureEvent {
        CaptureEvent::Record(CaptureRecord {
            simulation_id: SimulationId(1),
            id: PendingId::for_metric(0, step, "count"),
            frame: step,
            timestamp: step as f64 / 60.0,
            latency_frames: 0,
            payload: RecordPayload::Metric(Metric::default()),
        })
    }

    /// Mock sink for testing
    pub(crate) struct MockSink {
        pub name: String,
        pub write_count: Arc<AtomicU64>,
        pub should_fail: bool,
        pub delay_ms: u64,
    }

    impl RecordSink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, _event: &CaptureEvent) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_fail {
                return Err(ContractError::sink_write(&self.name, "mock failure"));
            }
            self.write_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_handle_basic() {
        let write_count = Arc::new(AtomicU64::new(0));
        let sink = MockSink {
            name: "test".to_string(),
            write_count: Arc::clone(&write_count),
            should_fail: false,
            delay_ms: 0,
        };

        let handle = SinkHandle::spawn(sink, 10);
        for step in 0..5 {
            assert!(handle.try_send(metric_event(step)));
        }
        let metrics = Arc::clone(handle.metrics());

        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.records_written(), 5);
    }

    #[tokio::test]
    async fn test_sink_handle_queue_full() {
        let sink = MockSink {
            name: "slow".to_string(),
            write_count: Arc::new(AtomicU64::new(0)),
            should_fail: false,
            delay_ms: 100,
        };

        let handle = SinkHandle::spawn(sink, 2);
        for step in 0..10 {
            handle.try_send(metric_event(step));
        }

        assert!(handle.metrics().dropped_count() > 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sink_handle_failure_isolation() {
        let sink = MockSink {
            name: "failing".to_string(),
            write_count: Arc::new(AtomicU64::new(0)),
            should_fail: true,
            delay_ms: 0,
        };

        let handle = SinkHandle::spawn(sink, 10);
        for step in 0..3 {
            handle.try_send(metric_event(step));
        }
        assert!(handle.send(metric_event(3)).await);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.metrics().failure_count(), 4);

        handle.shutdown().await;
    }
}
