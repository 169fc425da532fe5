//! Built-in consumer endpoints

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use contracts::{
    AnnotationDefinition, CaptureEvent, CaptureRecord, CompletionMetadata, ConsumerEndpoint,
    ContractError, MetricDefinition, SensorDefinition, SimulationId, SimulationMetadata,
};
use tracing::{debug, info};

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOutputEndpoint;

impl ConsumerEndpoint for NoOutputEndpoint {
    fn name(&self) -> &str {
        "none"
    }

    fn simulation_started(&mut self, _metadata: &SimulationMetadata) -> Result<(), ContractError> {
        Ok(())
    }

    fn record_finalized(&mut self, _record: CaptureRecord) -> Result<(), ContractError> {
        Ok(())
    }

    fn simulation_completed(&mut self, _summary: &CompletionMetadata) -> Result<(), ContractError> {
        Ok(())
    }
}

/// Writes every event to the tracing log
#[derive(Debug, Clone, Default)]
pub struct LogEndpoint {
    records: u64,
}

impl ConsumerEndpoint for LogEndpoint {
    fn name(&self) -> &str {
        "log"
    }

    fn simulation_started(&mut self, metadata: &SimulationMetadata) -> Result<(), ContractError> {
        self.records = 0;
        info!(
            simulation_id = %metadata.simulation_id,
            schema_version = %metadata.schema_version,
            "Capture started"
        );
        Ok(())
    }

    fn sensor_registered(&mut self, definition: &SensorDefinition) -> Result<(), ContractError> {
        info!(
            sensor_id = %definition.id,
            modality = %definition.modality,
            interval = definition.capture_interval,
            "Sensor registered"
        );
        Ok(())
    }

    fn record_finalized(&mut self, record: CaptureRecord) -> Result<(), ContractError> {
        self.records += 1;
        debug!(
            simulation_id = %record.simulation_id,
            id = %record.id,
            frame = record.frame,
            timestamp = record.timestamp,
            latency_frames = record.latency_frames,
            "Record finalized"
        );
        Ok(())
    }

    fn simulation_completed(&mut self, summary: &CompletionMetadata) -> Result<(), ContractError> {
        info!(
            simulation_id = %summary.simulation_id,
            records = self.records,
            frames = summary.total_frames,
            "Capture completed"
        );
        Ok(())
    }
}

/// Keeps every event in memory.
///
/// Clones share the same buffer, so a test can hand one clone to the
/// orchestrator and inspect the other.
#[derive(Debug, Clone)]
pub struct MemoryEndpoint {
    events: Rc<RefCell<Vec<CaptureEvent>>>,
    complete: Rc<Cell<bool>>,
    failing: Rc<Cell<bool>>,
    current: Rc<Cell<Option<SimulationId>>>,
}

impl Default for MemoryEndpoint {
    fn default() -> Self {
        Self {
            events: Rc::default(),
            complete: Rc::new(Cell::new(true)),
            failing: Rc::default(),
            current: Rc::default(),
        }
    }
}

impl MemoryEndpoint {
    pub fn events(&self) -> Vec<CaptureEvent> {
        self.events.borrow().clone()
    }

    pub fn records(&self) -> Vec<CaptureRecord> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                CaptureEvent::Record(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn completed(&self) -> Vec<CompletionMetadata> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                CaptureEvent::SimulationCompleted(summary) => Some(summary.clone()),
                _ => None,
            })
            .collect()
    }

    /// Value reported by `is_complete`
    pub fn set_complete(&self, complete: bool) {
        self.complete.set(complete);
    }

    /// Make every subsequent call fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    fn push(&self, event: CaptureEvent) -> Result<(), ContractError> {
        if self.failing.get() {
            return Err(ContractError::endpoint_write("memory", "configured to fail"));
        }
        self.events.borrow_mut().push(event);
        Ok(())
    }

    fn simulation_id(&self) -> SimulationId {
        self.current.get().unwrap_or(SimulationId(0))
    }
}

impl ConsumerEndpoint for MemoryEndpoint {
    fn name(&self) -> &str {
        "memory"
    }

    fn simulation_started(&mut self, metadata: &SimulationMetadata) -> Result<(), ContractError> {
        self.current.set(Some(metadata.simulation_id));
        self.push(CaptureEvent::SimulationStarted(metadata.clone()))
    }

    fn sensor_registered(&mut self, definition: &SensorDefinition) -> Result<(), ContractError> {
        self.push(CaptureEvent::SensorRegistered {
            simulation_id: self.simulation_id(),
            definition: definition.clone(),
        })
    }

    fn annotation_registered(
        &mut self,
        definition: &AnnotationDefinition,
    ) -> Result<(), ContractError> {
        self.push(CaptureEvent::AnnotationRegistered {
            simulation_id: self.simulation_id(),
            definition: definition.clone(),
        })
    }

    fn metric_registered(&mut self, definition: &MetricDefinition) -> Result<(), ContractError> {
        self.push(CaptureEvent::MetricRegistered {
            simulation_id: self.simulation_id(),
            definition: definition.clone(),
        })
    }

    fn record_finalized(&mut self, record: CaptureRecord) -> Result<(), ContractError> {
        self.push(CaptureEvent::Record(record))
    }

    fn simulation_completed(&mut self, summary: &CompletionMetadata) -> Result<(), ContractError> {
        self.push(CaptureEvent::SimulationCompleted(summary.clone()))
    }

    fn is_complete(&self) -> bool {
        self.complete.get()
    }
}
