//! Sensor and annotation handles

use std::fmt;
use std::hash::{Hash, Hasher};

use contracts::{
    Annotation, AnnotationDefinition, AnnotationId, DataModel, Metric, MetricDefinition,
    PendingId, Sensor, SensorId,
};
use tracing::debug;

use crate::error::{CaptureError, Result};
use crate::future::AsyncFuture;
use crate::simulation::{SimulationRef, SimulationState};

/// Handle to a sensor registered with one simulation.
///
/// Handles compare and hash by sensor id. The default handle is nil and
/// never valid.
#[derive(Clone, Default)]
pub struct SensorHandle {
    id: SensorId,
    simulation: SimulationRef,
}

impl PartialEq for SensorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SensorHandle {}

impl Hash for SensorHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for SensorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorHandle")
            .field("id", &self.id)
            .field("simulation", &self.simulation)
            .finish()
    }
}

impl fmt::Display for SensorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id.as_str())
    }
}

impl SensorHandle {
    pub(crate) fn new(id: SensorId, simulation: SimulationRef) -> Self {
        Self { id, simulation }
    }

    pub fn id(&self) -> &SensorId {
        &self.id
    }

    pub fn is_nil(&self) -> bool {
        self.id.is_empty()
    }

    /// Registered with a simulation that still accepts work
    pub fn is_valid(&self) -> bool {
        !self.is_nil()
            && self
                .simulation
                .read(|sim| sim.is_running() && sim.contains(&self.id))
                .unwrap_or(false)
    }

    pub fn enabled(&self) -> bool {
        self.simulation
            .read(|sim| sim.is_enabled(&self.id))
            .unwrap_or(false)
    }

    /// Enable or disable capture. A re-enabled scheduled sensor rejoins its
    /// grid at the next due frame.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.check_valid()?;
        self.simulation
            .update(|sim| sim.set_enabled(&self.id, enabled))
    }

    /// Whether the sensor is due on the current frame
    pub fn should_capture_this_frame(&self) -> bool {
        self.simulation
            .read(|sim| sim.should_capture_this_frame(&self.id))
            .unwrap_or(false)
    }

    /// Request a capture on the current frame (manual sensors only)
    pub fn request_capture(&self) -> Result<()> {
        self.check_valid()?;
        self.simulation.update(|sim| sim.request_capture(&self.id))
    }

    /// Stop capturing. Safe to call any number of times.
    pub fn dispose(&self) {
        if !self.is_valid() {
            return;
        }
        if let Err(err) = self.set_enabled(false) {
            debug!(sensor_id = %self.id, error = %err, "Ignoring dispose failure");
        }
    }

    fn check_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CaptureError::invalid_operation(format!(
                "sensor handle '{}' is nil, disposed or its simulation has ended",
                self.id
            )))
        }
    }

    /// Capture reports are only accepted on frames where the sensor is due
    fn check_capture_frame(&self, what: &str) -> Result<()> {
        if !self.should_capture_this_frame() {
            return Err(CaptureError::invalid_operation(format!(
                "{what} for sensor '{}' reported on a frame where it is not due",
                self.id
            )));
        }
        self.check_valid()
    }

    fn check_annotation_definition(&self, definition: &AnnotationDefinition) -> Result<()> {
        let registered = definition.is_valid()
            && self
                .simulation
                .read(|sim| sim.is_annotation_registered(&definition.id))
                .unwrap_or(false);
        if registered {
            Ok(())
        } else {
            Err(CaptureError::invalid_operation(format!(
                "annotation definition '{}' is not registered",
                definition.id
            )))
        }
    }

    fn check_metric_definition(&self, definition: &MetricDefinition) -> Result<()> {
        check_metric_registered(&self.simulation, definition)
    }

    /// Build the id at the current step and hand it to `f`
    fn with_current_id<R>(
        &self,
        make_id: impl FnOnce(u64, u64) -> PendingId,
        f: impl FnOnce(&mut SimulationState, PendingId) -> Result<R>,
    ) -> Result<R> {
        self.simulation.update(|sim| {
            let (sequence, step) = sim.current_sequence_and_step();
            f(sim, make_id(sequence, step))
        })
    }

    fn begin<T: DataModel>(&self, make_id: impl FnOnce(u64, u64) -> PendingId) -> Result<AsyncFuture<T>> {
        let pending_id = self.with_current_id(make_id, |sim, id| {
            sim.begin_async(id.clone())?;
            Ok(id)
        })?;
        Ok(AsyncFuture::new(pending_id, self.simulation.clone()))
    }

    // ===== Sensor data =====

    pub fn report_sensor(&self, sensor: Sensor) -> Result<()> {
        self.check_capture_frame("sensor data")?;
        let sensor_id = self.id.clone();
        self.with_current_id(
            |sequence, step| PendingId::for_sensor(sequence, step, sensor_id),
            |sim, id| sim.report(id, sensor.into_payload()),
        )
    }

    pub fn report_sensor_async(&self) -> Result<AsyncFuture<Sensor>> {
        self.check_capture_frame("sensor data")?;
        let sensor_id = self.id.clone();
        self.begin(|sequence, step| PendingId::for_sensor(sequence, step, sensor_id))
    }

    // ===== Annotations =====

    pub fn annotation_handle(&self, definition: &AnnotationDefinition) -> AnnotationHandle {
        AnnotationHandle {
            definition: definition.clone(),
            sensor: self.clone(),
        }
    }

    pub fn report_annotation(
        &self,
        definition: &AnnotationDefinition,
        annotation: Annotation,
    ) -> Result<AnnotationHandle> {
        self.check_capture_frame("annotation")?;
        self.check_annotation_definition(definition)?;
        let sensor_id = self.id.clone();
        let annotation_id = definition.id.clone();
        self.with_current_id(
            |sequence, step| PendingId::for_annotation(sequence, step, sensor_id, annotation_id),
            |sim, id| sim.report(id, annotation.into_payload()),
        )?;
        Ok(self.annotation_handle(definition))
    }

    pub fn report_annotation_async(
        &self,
        definition: &AnnotationDefinition,
    ) -> Result<AsyncFuture<Annotation>> {
        self.check_capture_frame("annotation")?;
        self.check_annotation_definition(definition)?;
        let sensor_id = self.id.clone();
        let annotation_id = definition.id.clone();
        self.begin(|sequence, step| {
            PendingId::for_annotation(sequence, step, sensor_id, annotation_id)
        })
    }

    // ===== Metrics =====

    pub fn report_metric(&self, definition: &MetricDefinition, metric: Metric) -> Result<()> {
        self.check_capture_frame("metric")?;
        self.check_metric_definition(definition)?;
        let sensor_id = self.id.clone();
        let metric_id = definition.id.clone();
        self.with_current_id(
            |sequence, step| PendingId::for_sensor_metric(sequence, step, sensor_id, metric_id),
            |sim, id| sim.report(id, metric.into_payload()),
        )
    }

    pub fn report_metric_async(&self, definition: &MetricDefinition) -> Result<AsyncFuture<Metric>> {
        self.check_capture_frame("metric")?;
        self.check_metric_definition(definition)?;
        let sensor_id = self.id.clone();
        let metric_id = definition.id.clone();
        self.begin(|sequence, step| {
            PendingId::for_sensor_metric(sequence, step, sensor_id, metric_id)
        })
    }
}

pub(crate) fn check_metric_registered(
    simulation: &SimulationRef,
    definition: &MetricDefinition,
) -> Result<()> {
    let registered = definition.is_valid()
        && simulation
            .read(|sim| sim.is_metric_registered(&definition.id))
            .unwrap_or(false);
    if registered {
        Ok(())
    } else {
        Err(CaptureError::invalid_operation(format!(
            "metric definition '{}' is not registered",
            definition.id
        )))
    }
}

/// An annotation of one sensor, used to attach metrics to it
#[derive(Debug, Clone, Default)]
pub struct AnnotationHandle {
    definition: AnnotationDefinition,
    sensor: SensorHandle,
}

impl PartialEq for AnnotationHandle {
    fn eq(&self, other: &Self) -> bool {
        self.sensor == other.sensor && self.definition.id == other.definition.id
    }
}

impl Eq for AnnotationHandle {}

impl Hash for AnnotationHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sensor.hash(state);
        self.definition.id.hash(state);
    }
}

impl AnnotationHandle {
    pub fn id(&self) -> &AnnotationId {
        &self.definition.id
    }

    pub fn definition(&self) -> &AnnotationDefinition {
        &self.definition
    }

    pub fn sensor(&self) -> &SensorHandle {
        &self.sensor
    }

    pub fn is_nil(&self) -> bool {
        self.definition.id.is_empty() || self.sensor.is_nil()
    }

    fn check_metric(&self, definition: &MetricDefinition) -> Result<()> {
        if self.is_nil() {
            return Err(CaptureError::invalid_operation("annotation handle is nil"));
        }
        self.sensor.check_capture_frame("annotation metric")?;
        self.sensor.check_metric_definition(definition)
    }

    pub fn report_metric(&self, definition: &MetricDefinition, metric: Metric) -> Result<()> {
        self.check_metric(definition)?;
        let sensor_id = self.sensor.id.clone();
        let annotation_id = self.definition.id.clone();
        let metric_id = definition.id.clone();
        self.sensor.with_current_id(
            |sequence, step| {
                PendingId::for_annotation_metric(sequence, step, sensor_id, annotation_id, metric_id)
            },
            |sim, id| sim.report(id, metric.into_payload()),
        )
    }

    pub fn report_metric_async(&self, definition: &MetricDefinition) -> Result<AsyncFuture<Metric>> {
        self.check_metric(definition)?;
        let sensor_id = self.sensor.id.clone();
        let annotation_id = self.definition.id.clone();
        let metric_id = definition.id.clone();
        self.sensor.begin(|sequence, step| {
            PendingId::for_annotation_metric(sequence, step, sensor_id, annotation_id, metric_id)
        })
    }
}
