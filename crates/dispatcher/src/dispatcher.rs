//! Dispatcher - main loop for fan-out to sinks

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{CaptureEvent, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink};

/// Dispatcher configuration
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<CaptureEvent>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<CaptureEvent>) -> Self {
        Self { config, input_rx }
    }

    /// Create every sink and start its worker
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        let handles = Self::initialize_handles(&self.config)?;

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }

    #[instrument(
        name = "dispatcher_initialize_handles",
        skip(config),
        fields(sink_count = config.sinks.len())
    )]
    fn initialize_handles(config: &DispatcherConfig) -> Result<Vec<SinkHandle>, DispatcherError> {
        let mut names = HashSet::new();
        let mut handles = Vec::with_capacity(config.sinks.len());
        for sink_config in &config.sinks {
            if !names.insert(sink_config.name.as_str()) {
                return Err(DispatcherError::DuplicateSink(sink_config.name.clone()));
            }
            handles.push(create_sink_handle(sink_config)?);
        }
        Ok(handles)
    }
}

#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}

/// Totals for one dispatcher run
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Events received from the endpoint channel
    pub events: u64,
    /// Of which were capture records
    pub records: u64,
    /// Simulations whose completion event was seen
    pub simulations_completed: u64,
    /// Final per-sink counters
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

/// Fans capture events out to every sink
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<CaptureEvent>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: mpsc::Receiver<CaptureEvent>) -> Self {
        Self { handles, input_rx }
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run until every sender of the input channel is dropped, then drain
    /// and close the sinks.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> DispatchReport {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut report = DispatchReport::default();

        while let Some(event) = self.input_rx.recv().await {
            report.events += 1;
            match &event {
                CaptureEvent::Record(_) => report.records += 1,
                CaptureEvent::SimulationCompleted(_) => report.simulations_completed += 1,
                _ => {}
            }
            Self::dispatch_event(&self.handles, event).await;

            if report.events.is_multiple_of(1000) {
                debug!(events = report.events, "Dispatcher progress");
            }
        }

        info!(
            events = report.events,
            records = report.records,
            "Dispatcher input closed, shutting down"
        );

        report.sinks = Self::shutdown_handles(self.handles).await;

        info!("Dispatcher shutdown complete");
        report
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<DispatchReport> {
        tokio::spawn(self.run())
    }

    /// Records may be dropped by a full sink queue; lifecycle events wait for room
    async fn dispatch_event(handles: &[SinkHandle], event: CaptureEvent) {
        let is_record = matches!(event, CaptureEvent::Record(_));
        for handle in handles {
            if is_record {
                handle.try_send(event.clone());
            } else {
                handle.send(event.clone()).await;
            }
        }
    }

    async fn shutdown_handles(handles: Vec<SinkHandle>) -> Vec<(String, MetricsSnapshot)> {
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            let name = handle.name().to_string();
            let metrics = std::sync::Arc::clone(handle.metrics());
            handle.shutdown().await;
            snapshots.push((name, metrics.snapshot()));
        }
        snapshots
    }
}

/// Convenience function to create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub async fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<CaptureEvent>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::tests::{metric_event, MockSink};
    use contracts::{SimulationId, SimulationMetadata};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn mock(name: &str, count: &Arc<AtomicU64>) -> MockSink {
        MockSink {
            name: name.to_string(),
            write_count: Arc::clone(count),
            should_fail: false,
            delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_dispatcher_fanout() {
        let (input_tx, input_rx) = mpsc::channel(10);
        let first = Arc::new(AtomicU64::new(0));
        let second = Arc::new(AtomicU64::new(0));

        let handles = vec![
            SinkHandle::spawn(mock("sink1", &first), 10),
            SinkHandle::spawn(mock("sink2", &second), 10),
        ];
        let handle = Dispatcher::with_handles(handles, input_rx).spawn();

        input_tx
            .send(CaptureEvent::SimulationStarted(SimulationMetadata::new(
                SimulationId(1),
            )))
            .await
            .unwrap();
        for step in 0..5 {
            input_tx.send(metric_event(step)).await.unwrap();
        }
        drop(input_tx);

        let report = handle.await.unwrap();
        assert_eq!(report.events, 6);
        assert_eq!(report.records, 5);
        assert_eq!(first.load(Ordering::Relaxed), 6);
        assert_eq!(second.load(Ordering::Relaxed), 6);
        assert_eq!(report.sinks.len(), 2);
        assert_eq!(report.sinks[0].1.records_written, 5);
    }

    #[tokio::test]
    async fn test_create_dispatcher_from_config() {
        let (input_tx, input_rx) = mpsc::channel(10);

        let configs = vec![SinkConfig {
            name: "test_log".to_string(),
            sink_type: SinkType::Log,
            queue_capacity: 50,
            params: HashMap::new(),
        }];

        let dispatcher = create_dispatcher(configs, input_rx).await.unwrap();
        let handle = dispatcher.spawn();

        input_tx.send(metric_event(0)).await.unwrap();
        drop(input_tx);

        let report = handle.await.unwrap();
        assert_eq!(report.sinks[0].0, "test_log");
        assert_eq!(report.sinks[0].1.events_written, 1);
    }

    #[tokio::test]
    async fn test_duplicate_sink_names_rejected() {
        let (_input_tx, input_rx) = mpsc::channel(1);
        let log = SinkConfig {
            name: "out".to_string(),
            sink_type: SinkType::Log,
            queue_capacity: 10,
            params: HashMap::new(),
        };

        let result = create_dispatcher(vec![log.clone(), log], input_rx).await;
        assert!(matches!(result, Err(DispatcherError::DuplicateSink(name)) if name == "out"));
    }
}
