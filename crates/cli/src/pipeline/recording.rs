//! Endpoint wrapper that feeds the run summary

use std::cell::RefCell;
use std::rc::Rc;

use contracts::{
    AnnotationDefinition, CaptureRecord, CompletionMetadata, ConsumerEndpoint, ContractError,
    MetricDefinition, SensorDefinition, SimulationMetadata,
};
use observability::CaptureMetricsAggregator;

/// Records every finalized record in a shared aggregator, then forwards it
pub struct RecordingEndpoint {
    inner: Box<dyn ConsumerEndpoint>,
    aggregator: Rc<RefCell<CaptureMetricsAggregator>>,
}

impl RecordingEndpoint {
    pub fn new(
        inner: Box<dyn ConsumerEndpoint>,
        aggregator: Rc<RefCell<CaptureMetricsAggregator>>,
    ) -> Self {
        Self { inner, aggregator }
    }
}

impl ConsumerEndpoint for RecordingEndpoint {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn simulation_started(&mut self, metadata: &SimulationMetadata) -> Result<(), ContractError> {
        self.inner.simulation_started(metadata)
    }

    fn sensor_registered(&mut self, definition: &SensorDefinition) -> Result<(), ContractError> {
        self.inner.sensor_registered(definition)
    }

    fn annotation_registered(
        &mut self,
        definition: &AnnotationDefinition,
    ) -> Result<(), ContractError> {
        self.inner.annotation_registered(definition)
    }

    fn metric_registered(&mut self, definition: &MetricDefinition) -> Result<(), ContractError> {
        self.inner.metric_registered(definition)
    }

    fn record_finalized(&mut self, record: CaptureRecord) -> Result<(), ContractError> {
        self.aggregator.borrow_mut().record(&record);
        self.inner.record_finalized(record)
    }

    fn simulation_completed(&mut self, summary: &CompletionMetadata) -> Result<(), ContractError> {
        self.aggregator.borrow_mut().completed(summary);
        self.inner.simulation_completed(summary)
    }

    fn is_complete(&self) -> bool {
        self.inner.is_complete()
    }
}
