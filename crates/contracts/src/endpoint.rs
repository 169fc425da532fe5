//! ConsumerEndpoint trait - scheduler output interface
//!
//! Every simulation owns exactly one endpoint and drives it synchronously from
//! the host tick.

use crate::{
    AnnotationDefinition, CaptureRecord, CompletionMetadata, ContractError, MetricDefinition,
    SensorDefinition, SimulationMetadata,
};

/// Sink for finalized capture records.
///
/// Errors returned by an endpoint are logged and counted by the simulation;
/// the event is not retried.
pub trait ConsumerEndpoint {
    /// Endpoint name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Simulation started producing output
    fn simulation_started(&mut self, metadata: &SimulationMetadata) -> Result<(), ContractError>;

    fn sensor_registered(&mut self, _definition: &SensorDefinition) -> Result<(), ContractError> {
        Ok(())
    }

    fn annotation_registered(
        &mut self,
        _definition: &AnnotationDefinition,
    ) -> Result<(), ContractError> {
        Ok(())
    }

    fn metric_registered(&mut self, _definition: &MetricDefinition) -> Result<(), ContractError> {
        Ok(())
    }

    /// Accept a finalized record
    fn record_finalized(&mut self, record: CaptureRecord) -> Result<(), ContractError>;

    /// Simulation drained and will produce no more output
    fn simulation_completed(&mut self, summary: &CompletionMetadata) -> Result<(), ContractError>;

    /// Whether everything handed to the endpoint has been consumed.
    ///
    /// A draining simulation only completes once this returns true.
    fn is_complete(&self) -> bool {
        true
    }
}

impl<E: ConsumerEndpoint + ?Sized> ConsumerEndpoint for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn simulation_started(&mut self, metadata: &SimulationMetadata) -> Result<(), ContractError> {
        (**self).simulation_started(metadata)
    }

    fn sensor_registered(&mut self, definition: &SensorDefinition) -> Result<(), ContractError> {
        (**self).sensor_registered(definition)
    }

    fn annotation_registered(
        &mut self,
        definition: &AnnotationDefinition,
    ) -> Result<(), ContractError> {
        (**self).annotation_registered(definition)
    }

    fn metric_registered(&mut self, definition: &MetricDefinition) -> Result<(), ContractError> {
        (**self).metric_registered(definition)
    }

    fn record_finalized(&mut self, record: CaptureRecord) -> Result<(), ContractError> {
        (**self).record_finalized(record)
    }

    fn simulation_completed(&mut self, summary: &CompletionMetadata) -> Result<(), ContractError> {
        (**self).simulation_completed(summary)
    }

    fn is_complete(&self) -> bool {
        (**self).is_complete()
    }
}
