//! ChannelEndpoint - bridge from the host thread to the dispatcher task

use tokio::sync::mpsc;
use tracing::warn;

use contracts::{
    AnnotationDefinition, CaptureEvent, CaptureRecord, CompletionMetadata, ConsumerEndpoint,
    ContractError, MetricDefinition, SensorDefinition, SimulationId, SimulationMetadata,
};

/// What to do when the dispatcher channel is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendMode {
    /// Fail the call; the simulation counts it as an endpoint failure
    #[default]
    DropWhenFull,
    /// Block the host thread until there is room.
    ///
    /// Must not be used from inside an async context.
    Block,
}

/// Consumer endpoint that forwards every event to a channel.
///
/// Clones share the channel, so one instance can be handed to
/// `DatasetCapture::set_endpoint` and serve every simulation.
#[derive(Debug, Clone)]
pub struct ChannelEndpoint {
    name: String,
    tx: mpsc::Sender<CaptureEvent>,
    mode: SendMode,
    simulation_id: Option<SimulationId>,
}

impl ChannelEndpoint {
    pub fn new(name: impl Into<String>, tx: mpsc::Sender<CaptureEvent>) -> Self {
        Self {
            name: name.into(),
            tx,
            mode: SendMode::default(),
            simulation_id: None,
        }
    }

    pub fn with_mode(mut self, mode: SendMode) -> Self {
        self.mode = mode;
        self
    }

    /// Events sent but not yet taken by the dispatcher
    pub fn in_flight(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    fn send(&self, event: CaptureEvent) -> Result<(), ContractError> {
        match self.mode {
            SendMode::DropWhenFull => match self.tx.try_send(event) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(event)) => {
                    warn!(endpoint = %self.name, event = event.label(), "Dispatcher channel full, event dropped");
                    Err(ContractError::endpoint_write(&self.name, "dispatcher channel full"))
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    Err(ContractError::endpoint_closed(&self.name))
                }
            },
            SendMode::Block => self
                .tx
                .blocking_send(event)
                .map_err(|_| ContractError::endpoint_closed(&self.name)),
        }
    }

    fn current_simulation(&self) -> SimulationId {
        self.simulation_id.unwrap_or(SimulationId(0))
    }
}

impl ConsumerEndpoint for ChannelEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn simulation_started(&mut self, metadata: &SimulationMetadata) -> Result<(), ContractError> {
        self.simulation_id = Some(metadata.simulation_id);
        self.send(CaptureEvent::SimulationStarted(metadata.clone()))
    }

    fn sensor_registered(&mut self, definition: &SensorDefinition) -> Result<(), ContractError> {
        self.send(CaptureEvent::SensorRegistered {
            simulation_id: self.current_simulation(),
            definition: definition.clone(),
        })
    }

    fn annotation_registered(
        &mut self,
        definition: &AnnotationDefinition,
    ) -> Result<(), ContractError> {
        self.send(CaptureEvent::AnnotationRegistered {
            simulation_id: self.current_simulation(),
            definition: definition.clone(),
        })
    }

    fn metric_registered(&mut self, definition: &MetricDefinition) -> Result<(), ContractError> {
        self.send(CaptureEvent::MetricRegistered {
            simulation_id: self.current_simulation(),
            definition: definition.clone(),
        })
    }

    fn record_finalized(&mut self, record: CaptureRecord) -> Result<(), ContractError> {
        self.send(CaptureEvent::Record(record))
    }

    fn simulation_completed(&mut self, summary: &CompletionMetadata) -> Result<(), ContractError> {
        self.send(CaptureEvent::SimulationCompleted(summary.clone()))
    }

    /// The dispatcher has taken every event sent so far.
    ///
    /// Clones share one channel, so a draining simulation also waits for the
    /// active simulation's events. Under sustained traffic it can reach
    /// `shutdown_grace_frames` and be completed by force.
    fn is_complete(&self) -> bool {
        self.tx.is_closed() || self.in_flight() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Metric, PendingId, RecordPayload};

    fn record() -> CaptureRecord {
        CaptureRecord {
            simulation_id: SimulationId(2),
            id: PendingId::for_metric(0, 0, "count"),
            frame: 0,
            timestamp: 0.0,
            latency_frames: 0,
            payload: RecordPayload::Metric(Metric::default()),
        }
    }

    #[test]
    fn test_forwards_events_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut endpoint = ChannelEndpoint::new("dispatch", tx);

        endpoint
            .simulation_started(&SimulationMetadata::new(SimulationId(2)))
            .unwrap();
        endpoint
            .sensor_registered(&SensorDefinition::new("cam", "camera"))
            .unwrap();
        endpoint.record_finalized(record()).unwrap();
        assert_eq!(endpoint.in_flight(), 3);
        assert!(!endpoint.is_complete());

        let labels: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| (event.label(), event.simulation_id()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("simulation_started", SimulationId(2)),
                ("sensor_registered", SimulationId(2)),
                ("record", SimulationId(2)),
            ]
        );
        assert!(endpoint.is_complete());
    }

    #[test]
    fn test_full_channel_is_an_endpoint_error() {
        let (tx, _rx) = mpsc::channel(1);
        let mut endpoint = ChannelEndpoint::new("dispatch", tx);
        endpoint.record_finalized(record()).unwrap();

        let err = endpoint.record_finalized(record()).unwrap_err();
        assert!(matches!(err, ContractError::EndpointWrite { .. }));
    }

    #[test]
    fn test_clones_share_completion() {
        let (tx, mut rx) = mpsc::channel(8);
        let draining = ChannelEndpoint::new("dispatch", tx);
        let mut active = draining.clone();
        assert!(draining.is_complete());

        active.record_finalized(record()).unwrap();
        assert!(!draining.is_complete());

        rx.try_recv().unwrap();
        assert!(draining.is_complete());
    }

    #[test]
    fn test_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut endpoint = ChannelEndpoint::new("dispatch", tx);

        let err = endpoint.record_finalized(record()).unwrap_err();
        assert!(matches!(err, ContractError::EndpointClosed { .. }));
        assert!(endpoint.is_complete());
    }
}
