//! DatasetCapture - capture orchestrator
//!
//! Owns the active simulation and the simulations still draining after a
//! reset, and decides which consumer endpoint new simulations are bound to.

use std::any::type_name;
use std::fmt;

use contracts::{
    AnnotationDefinition, ConsumerEndpoint, DataModel, Metric, MetricDefinition, PendingId,
    SensorDefinition, SimulationConfig, SimulationId,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{CaptureError, Result};
use crate::future::AsyncFuture;
use crate::handle::{check_metric_registered, SensorHandle};
use crate::registry::{EndpointFactory, EndpointRegistry};
use crate::simulation::{SharedSimulation, SimulationRef, SimulationState};

/// Outcome of [`DatasetCapture::wait_until_complete`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Ticks spent waiting
    pub ticks: u64,
    /// Futures abandoned while waiting, by timeout, grace period or the bound
    pub futures_discarded: u64,
    /// Every simulation drained on its own
    pub clean: bool,
}

/// Capture orchestrator.
///
/// Call [`update`](Self::update) once per host frame after sensors have been
/// polled, and [`notify_shutdown`](Self::notify_shutdown) once when the host
/// exits.
pub struct DatasetCapture {
    config: SimulationConfig,
    active: Option<SharedSimulation>,
    /// Superseded simulations, oldest first
    shutting_down: Vec<SharedSimulation>,
    ready_to_shutdown: bool,
    endpoint: Option<EndpointFactory>,
    endpoint_type: Option<EndpointFactory>,
    registry: EndpointRegistry,
    next_simulation_id: u64,
    ending_listeners: Vec<Box<dyn FnMut()>>,
    /// Futures abandoned by simulations already evicted from `shutting_down`
    evicted_abandoned: u64,
}

impl fmt::Debug for DatasetCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetCapture")
            .field("active", &self.active)
            .field("shutting_down", &self.shutting_down.len())
            .field("ready_to_shutdown", &self.ready_to_shutdown)
            .field("endpoint", &self.endpoint)
            .field("endpoint_type", &self.endpoint_type)
            .finish_non_exhaustive()
    }
}

impl Default for DatasetCapture {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl DatasetCapture {
    /// Orchestrator with no endpoint configured and the built-in registry
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            active: None,
            shutting_down: Vec::new(),
            ready_to_shutdown: false,
            endpoint: None,
            endpoint_type: None,
            registry: EndpointRegistry::with_builtin(),
            next_simulation_id: 1,
            ending_listeners: Vec::new(),
            evicted_abandoned: 0,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn active_simulation(&self) -> Option<&SharedSimulation> {
        self.active.as_ref()
    }

    pub fn active_simulation_id(&self) -> Option<SimulationId> {
        self.active.as_ref().map(|sim| sim.borrow().id())
    }

    pub fn shutting_down_count(&self) -> usize {
        self.shutting_down.len()
    }

    pub fn is_ready_to_shutdown(&self) -> bool {
        self.ready_to_shutdown
    }

    pub fn endpoint_registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn endpoint_registry_mut(&mut self) -> &mut EndpointRegistry {
        &mut self.registry
    }

    fn endpoint_factory(&self) -> Option<EndpointFactory> {
        self.endpoint.as_ref().or(self.endpoint_type.as_ref()).cloned()
    }

    fn create_simulation(&mut self, factory: &EndpointFactory) -> SharedSimulation {
        let id = SimulationId(self.next_simulation_id);
        self.next_simulation_id += 1;
        debug!(simulation_id = %id, endpoint = factory.name(), "Creating simulation");
        SimulationState::new(id, self.config.clone(), factory.create()).into_shared()
    }

    /// The active simulation, created on first use
    pub fn current_simulation(&mut self) -> Result<SharedSimulation> {
        if let Some(active) = &self.active {
            return Ok(active.clone());
        }
        let factory = self
            .endpoint_factory()
            .ok_or(CaptureError::NoEndpointConfigured)?;
        let simulation = self.create_simulation(&factory);
        self.active = Some(simulation.clone());
        Ok(simulation)
    }

    fn with_current<R>(&mut self, f: impl FnOnce(&mut SimulationState) -> Result<R>) -> Result<R> {
        let simulation = self.current_simulation()?;
        let mut state = simulation.borrow_mut();
        f(&mut state)
    }

    // ===== Registration =====

    /// Register a sensor, or update the schedule of one with the same id
    #[instrument(level = "debug", skip(self, definition), fields(sensor_id = %definition.id))]
    pub fn register_sensor(&mut self, definition: SensorDefinition) -> Result<SensorHandle> {
        let simulation = self.current_simulation()?;
        let id = definition.id.clone();
        simulation.borrow_mut().add_sensor(definition)?;
        Ok(SensorHandle::new(id, SimulationRef::new(&simulation)))
    }

    pub fn register_metric(&mut self, definition: MetricDefinition) -> Result<()> {
        self.with_current(|sim| sim.register_metric(definition))
    }

    pub fn register_annotation_definition(&mut self, definition: AnnotationDefinition) -> Result<()> {
        self.with_current(|sim| sim.register_annotation_definition(definition))
    }

    /// Whether `sensor_id` is registered with the active simulation
    pub fn is_valid(&self, sensor_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|sim| sim.borrow().contains(sensor_id))
    }

    // ===== Sequences =====

    pub fn start_new_sequence(&mut self) -> Result<()> {
        self.with_current(SimulationState::start_new_sequence)
    }

    pub fn sequence_and_step_from_frame(&mut self, frame: u64) -> Result<(u64, u64)> {
        self.with_current(|sim| Ok(sim.sequence_and_step_from_frame(frame)))
    }

    // ===== Global metrics =====

    /// Report a simulation-wide metric for the current step
    pub fn report_metric(&mut self, definition: &MetricDefinition, metric: Metric) -> Result<()> {
        let simulation = self.current_simulation()?;
        let simulation_ref = SimulationRef::new(&simulation);
        check_metric_registered(&simulation_ref, definition)?;
        let metric_id = definition.id.clone();
        simulation_ref.update(|sim| {
            let (sequence, step) = sim.current_sequence_and_step();
            sim.report(
                PendingId::for_metric(sequence, step, metric_id),
                metric.into_payload(),
            )
        })
    }

    /// Start a simulation-wide metric to be resolved on a later frame
    pub fn report_metric_async(&mut self, definition: &MetricDefinition) -> Result<AsyncFuture<Metric>> {
        let simulation = self.current_simulation()?;
        let simulation_ref = SimulationRef::new(&simulation);
        check_metric_registered(&simulation_ref, definition)?;
        let metric_id = definition.id.clone();
        let pending_id = simulation_ref.update(|sim| {
            let (sequence, step) = sim.current_sequence_and_step();
            let id = PendingId::for_metric(sequence, step, metric_id);
            sim.begin_async(id.clone())?;
            Ok(id)
        })?;
        Ok(AsyncFuture::new(pending_id, simulation_ref))
    }

    // ===== Endpoints =====

    /// Bind every new simulation to a clone of `endpoint`.
    ///
    /// Takes priority over the endpoint type. An active simulation that has
    /// not started yet is rebound immediately.
    pub fn set_endpoint<E>(&mut self, endpoint: E)
    where
        E: ConsumerEndpoint + Clone + 'static,
    {
        let factory = EndpointFactory::from_instance(endpoint);
        info!(endpoint = factory.name(), "Setting endpoint instance");
        self.rebind_not_started(&factory);
        self.endpoint = Some(factory);
    }

    /// Default-construct `E` for every new simulation. Always succeeds.
    pub fn set_endpoint_type<E>(&mut self) -> bool
    where
        E: ConsumerEndpoint + Default + 'static,
    {
        let factory = EndpointFactory::of_type::<E>(type_name::<E>());
        self.apply_endpoint_type(factory);
        true
    }

    /// Select a registered endpoint type by name.
    ///
    /// Unknown names leave the current type unchanged and return false.
    pub fn set_endpoint_type_by_name(&mut self, name: &str) -> bool {
        match self.registry.get(name).cloned() {
            Some(factory) => {
                self.apply_endpoint_type(factory);
                true
            }
            None => {
                info!(
                    endpoint = name,
                    known = ?self.registry.names().collect::<Vec<_>>(),
                    "Not setting endpoint type: no endpoint registered under this name"
                );
                false
            }
        }
    }

    fn apply_endpoint_type(&mut self, factory: EndpointFactory) {
        info!(endpoint = factory.name(), "Setting endpoint type");
        if self.endpoint.is_none() {
            self.rebind_not_started(&factory);
        }
        self.endpoint_type = Some(factory);
    }

    fn rebind_not_started(&mut self, factory: &EndpointFactory) {
        if let Some(active) = &self.active {
            let mut sim = active.borrow_mut();
            if sim.replace_endpoint(factory.create()) {
                debug!(simulation_id = %sim.id(), endpoint = factory.name(), "Rebound endpoint");
            }
        }
    }

    pub fn endpoint_type_name(&self) -> Option<&str> {
        self.endpoint_type.as_ref().map(EndpointFactory::name)
    }

    pub fn endpoint_name(&self) -> Option<&str> {
        self.endpoint.as_ref().map(EndpointFactory::name)
    }

    // ===== Lifecycle =====

    /// Called right before a simulation is superseded
    pub fn on_simulation_ending(&mut self, listener: impl FnMut() + 'static) {
        self.ending_listeners.push(Box::new(listener));
    }

    /// Advance the active simulation, then the draining ones in the order
    /// they were superseded, and drop the ones that completed.
    #[instrument(level = "trace", name = "capture_update", skip(self))]
    pub fn update(&mut self) {
        if let Some(active) = &self.active {
            active.borrow_mut().update();
        }
        for simulation in &self.shutting_down {
            simulation.borrow_mut().update();
        }
        self.evict_completed();
    }

    fn evict_completed(&mut self) {
        let evicted_abandoned = &mut self.evicted_abandoned;
        self.shutting_down.retain(|sim| {
            let sim = sim.borrow();
            if sim.is_complete() {
                *evicted_abandoned += sim.stats().futures_abandoned;
                false
            } else {
                true
            }
        });
    }

    /// Futures abandoned so far by every simulation this orchestrator has driven
    pub fn futures_abandoned(&self) -> u64 {
        self.evicted_abandoned
            + self
                .shutting_down
                .iter()
                .chain(self.active.iter())
                .map(|sim| sim.borrow().stats().futures_abandoned)
                .sum::<u64>()
    }

    /// Supersede the active simulation with a fresh one.
    ///
    /// A running simulation keeps draining its outstanding futures in the
    /// background; one that never started is discarded.
    ///
    /// # Errors
    /// `NoEndpointConfigured` if no endpoint instance or type has been set.
    /// Nothing changes in that case.
    #[instrument(level = "debug", skip(self))]
    pub fn reset_simulation(&mut self) -> Result<()> {
        let factory = self
            .endpoint_factory()
            .ok_or(CaptureError::NoEndpointConfigured)?;

        for listener in &mut self.ending_listeners {
            listener();
        }

        if let Some(previous) = self.active.take() {
            let running = previous.borrow().is_running();
            previous.borrow_mut().end();
            if running {
                info!(
                    simulation_id = %previous.borrow().id(),
                    draining = self.shutting_down.len() + 1,
                    "Simulation superseded"
                );
                self.shutting_down.push(previous);
            }
        }

        let simulation = self.create_simulation(&factory);
        self.active = Some(simulation);
        Ok(())
    }

    /// Shutdown hook: supersede the active simulation and allow shutdown
    /// once everything has drained.
    pub fn notify_shutdown(&mut self) -> Result<()> {
        self.reset_simulation()?;
        self.ready_to_shutdown = true;
        info!(draining = self.shutting_down.len(), "Shutdown requested");
        Ok(())
    }

    pub fn can_be_shutdown(&self) -> bool {
        let not_running = |sim: &SharedSimulation| sim.borrow().is_not_running();
        self.ready_to_shutdown
            && self.active.as_ref().map_or(true, not_running)
            && self.shutting_down.iter().all(not_running)
    }

    /// Tick until shutdown is possible or `max_ticks` have passed, then
    /// force-complete anything still draining.
    #[instrument(level = "debug", skip(self))]
    pub fn wait_until_complete(&mut self, max_ticks: u64) -> ShutdownReport {
        if !self.ready_to_shutdown {
            warn!("wait_until_complete called before notify_shutdown");
            return ShutdownReport::default();
        }

        let abandoned_before = self.futures_abandoned();
        let mut ticks = 0;
        while !self.can_be_shutdown() && ticks < max_ticks {
            self.update();
            ticks += 1;
        }

        let forced = !self.can_be_shutdown();
        if forced {
            for simulation in self.shutting_down.iter().chain(self.active.iter()) {
                let mut sim = simulation.borrow_mut();
                if !sim.is_not_running() {
                    sim.force_complete();
                }
            }
            self.evict_completed();
        }

        let futures_discarded = self.futures_abandoned().saturating_sub(abandoned_before);
        if forced {
            warn!(ticks, futures_discarded, "Shutdown wait bound reached; forced completion");
        } else if futures_discarded > 0 {
            warn!(ticks, futures_discarded, "Shutdown completed after abandoning futures");
        }

        ShutdownReport {
            ticks,
            futures_discarded,
            clean: !forced && futures_discarded == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{LogEndpoint, MemoryEndpoint, NoOutputEndpoint};
    use crate::simulation::ExecutionState;
    use contracts::{Annotation, Sensor, Value};
    use std::cell::Cell;
    use std::rc::Rc;

    fn capture_with_memory() -> (DatasetCapture, MemoryEndpoint) {
        let endpoint = MemoryEndpoint::default();
        let mut capture = DatasetCapture::default();
        capture.set_endpoint(endpoint.clone());
        (capture, endpoint)
    }

    #[test]
    fn test_interval_two_sensor_is_due_on_even_frames() {
        let (mut capture, _) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera").with_capture_interval(2))
            .unwrap();

        let mut due = Vec::new();
        for frame in 0..5 {
            due.push(sensor.should_capture_this_frame());
            if frame < 4 {
                capture.update();
            }
        }
        assert_eq!(due, vec![true, false, true, false, true]);
    }

    #[test]
    fn test_sync_report_on_non_due_frame_fails() {
        let (mut capture, endpoint) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera").with_capture_interval(2))
            .unwrap();
        capture.update();

        let err = sensor.report_sensor(Sensor::default()).unwrap_err();
        assert!(err.is_invalid_operation());
        assert!(endpoint.records().is_empty());
    }

    #[test]
    fn test_new_sequence_resets_step() {
        let (mut capture, _) = capture_with_memory();
        capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        for _ in 0..3 {
            capture.update();
        }
        capture.start_new_sequence().unwrap();
        capture.update();

        assert_eq!(capture.sequence_and_step_from_frame(3).unwrap(), (1, 0));
        assert_eq!(capture.sequence_and_step_from_frame(4).unwrap(), (1, 1));
        assert_eq!(capture.sequence_and_step_from_frame(2).unwrap(), (0, 2));
    }

    #[test]
    fn test_reset_drains_outstanding_futures() {
        let (mut capture, endpoint) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        let first = sensor.report_sensor_async().unwrap();
        capture.update();
        let second = sensor.report_sensor_async().unwrap();

        capture.reset_simulation().unwrap();
        assert_eq!(capture.shutting_down_count(), 1);
        assert!(!first.is_valid());
        assert!(first.is_pending());

        first.report(Sensor::default()).unwrap();
        capture.update();
        assert_eq!(capture.shutting_down_count(), 1);

        second.report(Sensor::default()).unwrap();
        capture.update();
        assert_eq!(capture.shutting_down_count(), 0);

        assert_eq!(endpoint.records().len(), 2);
        assert_eq!(endpoint.completed().len(), 1);
    }

    #[test]
    fn test_unknown_endpoint_name_is_ignored() {
        let mut capture = DatasetCapture::default();
        assert!(capture.set_endpoint_type_by_name("log"));
        assert_eq!(capture.endpoint_type_name(), Some("log"));

        assert!(!capture.set_endpoint_type_by_name("carrier-pigeon"));
        assert_eq!(capture.endpoint_type_name(), Some("log"));
    }

    #[test]
    fn test_set_endpoint_type_by_generic() {
        let mut capture = DatasetCapture::default();
        assert!(capture.set_endpoint_type::<NoOutputEndpoint>());
        let simulation = capture.current_simulation().unwrap();
        assert_eq!(simulation.borrow().endpoint_name(), "none");
    }

    #[test]
    fn test_double_async_report_fails() {
        let (mut capture, _) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        let future = sensor.report_sensor_async().unwrap();
        future.report(Sensor::default()).unwrap();

        let err = future.report(Sensor::default()).unwrap_err();
        assert!(err.is_invalid_operation());
    }

    #[test]
    fn test_future_invalid_after_end() {
        let (mut capture, _) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        let future = sensor.report_sensor_async().unwrap();
        assert!(future.is_valid());

        capture.notify_shutdown().unwrap();
        assert!(!future.is_valid());
        assert!(!sensor.is_valid());
    }

    #[test]
    fn test_async_future_resolves_on_non_due_frame() {
        let (mut capture, endpoint) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera").with_capture_interval(3))
            .unwrap();
        let future = sensor.report_sensor_async().unwrap();
        capture.update();
        assert!(!sensor.should_capture_this_frame());

        future.report(Sensor::default()).unwrap();
        let records = endpoint.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].frame, 0);
        assert_eq!(records[0].latency_frames, 1);
    }

    #[test]
    fn test_reset_without_endpoint_keeps_state() {
        let mut capture = DatasetCapture::default();
        let err = capture.reset_simulation().unwrap_err();
        assert!(matches!(err, CaptureError::NoEndpointConfigured));
        assert!(capture.active_simulation().is_none());
        assert!(capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .is_err());
    }

    #[test]
    fn test_register_sensor_rejects_zero_interval() {
        let (mut capture, _) = capture_with_memory();
        let err = capture
            .register_sensor(SensorDefinition::new("cam", "camera").with_capture_interval(0))
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(!capture.is_valid("cam"));
    }

    #[test]
    fn test_register_sensor_rejects_far_first_frame_mid_sequence() {
        let (mut capture, _) = capture_with_memory();
        capture.update();
        capture.start_new_sequence().unwrap();

        let err = capture
            .register_sensor(
                SensorDefinition::new("cam", "camera").with_first_capture_frame(u64::MAX),
            )
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let late = capture
            .register_sensor(
                SensorDefinition::new("cam", "camera")
                    .with_first_capture_frame(contracts::MAX_FIRST_CAPTURE_FRAME),
            )
            .unwrap();
        assert!(!late.should_capture_this_frame());
    }

    #[test]
    fn test_reregistering_sensor_updates_schedule() {
        let (mut capture, _) = capture_with_memory();
        let first = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        let second = capture
            .register_sensor(SensorDefinition::new("cam", "camera").with_capture_interval(4))
            .unwrap();
        assert_eq!(first, second);

        capture.update();
        assert!(!first.should_capture_this_frame());
    }

    #[test]
    fn test_manual_sensor_captures_on_request() {
        let (mut capture, _) = capture_with_memory();
        let manual = capture
            .register_sensor(SensorDefinition::new("cam", "camera").manual())
            .unwrap();
        let scheduled = capture
            .register_sensor(SensorDefinition::new("lidar", "lidar"))
            .unwrap();

        assert!(!manual.should_capture_this_frame());
        manual.request_capture().unwrap();
        assert!(manual.should_capture_this_frame());
        manual.report_sensor(Sensor::default()).unwrap();

        capture.update();
        assert!(!manual.should_capture_this_frame());

        let err = scheduled.request_capture().unwrap_err();
        assert!(err.is_invalid_operation());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let (mut capture, _) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        sensor.dispose();
        sensor.dispose();
        assert!(!sensor.enabled());
        assert!(!sensor.should_capture_this_frame());

        SensorHandle::default().dispose();
    }

    #[test]
    fn test_annotation_and_metric_reports() {
        let (mut capture, endpoint) = capture_with_memory();
        let bbox = AnnotationDefinition::new("bbox");
        let count = MetricDefinition::new("object_count");
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();

        let err = sensor
            .report_annotation(&bbox, Annotation::new([Value::from(1)]))
            .unwrap_err();
        assert!(err.is_invalid_operation());

        capture.register_annotation_definition(bbox.clone()).unwrap();
        capture.register_metric(count.clone()).unwrap();

        let annotation = sensor
            .report_annotation(&bbox, Annotation::new([Value::from(1)]))
            .unwrap();
        annotation
            .report_metric(&count, Metric::new([Value::from(3)]))
            .unwrap();
        sensor
            .report_metric(&count, Metric::new([Value::from(5)]))
            .unwrap();
        capture
            .report_metric(&count, Metric::new([Value::from(7)]))
            .unwrap();

        let ids: Vec<_> = endpoint.records().into_iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![
                PendingId::for_annotation(0, 0, "cam", "bbox"),
                PendingId::for_annotation_metric(0, 0, "cam", "bbox", "object_count"),
                PendingId::for_sensor_metric(0, 0, "cam", "object_count"),
                PendingId::for_metric(0, 0, "object_count"),
            ]
        );
    }

    #[test]
    fn test_set_enabled_leaves_and_rejoins_schedule() {
        let (mut capture, _) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        assert!(sensor.should_capture_this_frame());

        sensor.set_enabled(false).unwrap();
        assert!(!sensor.enabled());
        assert!(!sensor.should_capture_this_frame());
        capture.update();
        assert!(!sensor.should_capture_this_frame());

        sensor.set_enabled(true).unwrap();
        assert!(sensor.enabled());
        assert!(sensor.should_capture_this_frame());
        sensor.report_sensor(Sensor::default()).unwrap();
    }

    #[test]
    fn test_set_enabled_fails_once_superseded() {
        let (mut capture, _) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        capture.reset_simulation().unwrap();
        assert!(sensor.set_enabled(false).unwrap_err().is_invalid_operation());

        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        capture.notify_shutdown().unwrap();
        assert!(sensor.set_enabled(true).unwrap_err().is_invalid_operation());
    }

    #[test]
    fn test_sensor_and_annotation_metric_futures() {
        let (mut capture, endpoint) = capture_with_memory();
        let bbox = AnnotationDefinition::new("bbox");
        let count = MetricDefinition::new("object_count");
        capture.register_annotation_definition(bbox.clone()).unwrap();
        capture.register_metric(count.clone()).unwrap();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();

        let sensor_metric = sensor.report_metric_async(&count).unwrap();
        let annotation_metric = sensor
            .annotation_handle(&bbox)
            .report_metric_async(&count)
            .unwrap();
        assert!(sensor_metric.is_pending());
        assert!(annotation_metric.is_pending());

        capture.update();
        annotation_metric.report(Metric::new([Value::from(4)])).unwrap();
        sensor_metric.report(Metric::new([Value::from(9)])).unwrap();

        let records = endpoint.records();
        let ids: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                PendingId::for_annotation_metric(0, 0, "cam", "bbox", "object_count"),
                PendingId::for_sensor_metric(0, 0, "cam", "object_count"),
            ]
        );
        assert!(records.iter().all(|r| r.frame == 0 && r.latency_frames == 1));

        let unregistered = MetricDefinition::new("missing");
        assert!(sensor
            .report_metric_async(&unregistered)
            .unwrap_err()
            .is_invalid_operation());
    }

    #[test]
    fn test_global_metric_future() {
        let (mut capture, endpoint) = capture_with_memory();
        let count = MetricDefinition::new("count");
        capture.register_metric(count.clone()).unwrap();

        let future = capture.report_metric_async(&count).unwrap();
        capture.update();
        future.report(Metric::new([Value::from(2)])).unwrap();

        let records = endpoint.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, PendingId::for_metric(0, 0, "count"));
    }

    #[test]
    fn test_ending_listeners_fire_on_reset() {
        let (mut capture, _) = capture_with_memory();
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        capture.on_simulation_ending(move || counter.set(counter.get() + 1));

        capture.reset_simulation().unwrap();
        capture.notify_shutdown().unwrap();
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn test_shutdown_gate() {
        let (mut capture, endpoint) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        let future = sensor.report_sensor_async().unwrap();
        assert!(!capture.can_be_shutdown());

        capture.notify_shutdown().unwrap();
        assert!(capture.is_ready_to_shutdown());
        assert!(!capture.can_be_shutdown());

        capture.update();
        future.report(Sensor::default()).unwrap();
        capture.update();
        assert!(capture.can_be_shutdown());
        assert_eq!(endpoint.completed().len(), 1);
    }

    #[test]
    fn test_wait_until_complete_forces_after_bound() {
        let (mut capture, endpoint) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        let _abandoned = sensor.report_sensor_async().unwrap();
        capture.notify_shutdown().unwrap();

        let report = capture.wait_until_complete(5);
        assert_eq!(report.ticks, 5);
        assert_eq!(report.futures_discarded, 1);
        assert!(!report.clean);
        assert!(capture.can_be_shutdown());
        assert_eq!(endpoint.completed()[0].futures_abandoned, 1);
    }

    #[test]
    fn test_wait_until_complete_reports_grace_discards() {
        let endpoint = MemoryEndpoint::default();
        let mut capture = DatasetCapture::new(SimulationConfig {
            shutdown_grace_frames: 3,
            ..SimulationConfig::default()
        });
        capture.set_endpoint(endpoint.clone());
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        let _unresolved = sensor.report_sensor_async().unwrap();
        capture.notify_shutdown().unwrap();

        let report = capture.wait_until_complete(10);
        assert_eq!(report.ticks, 3);
        assert_eq!(report.futures_discarded, 1);
        assert!(!report.clean);
        assert_eq!(endpoint.completed()[0].futures_abandoned, 1);
    }

    #[test]
    fn test_wait_until_complete_clean_when_drained() {
        let (mut capture, _) = capture_with_memory();
        let sensor = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        let future = sensor.report_sensor_async().unwrap();
        capture.notify_shutdown().unwrap();
        future.report(Sensor::default()).unwrap();

        let report = capture.wait_until_complete(10);
        assert!(report.clean);
        assert_eq!(report.futures_discarded, 0);
    }

    #[test]
    fn test_set_endpoint_rebinds_not_started_simulation() {
        let mut capture = DatasetCapture::default();
        capture.set_endpoint_type::<LogEndpoint>();
        let simulation = capture.current_simulation().unwrap();
        assert_eq!(simulation.borrow().execution_state(), ExecutionState::NotStarted);

        let endpoint = MemoryEndpoint::default();
        capture.set_endpoint(endpoint.clone());
        assert_eq!(simulation.borrow().endpoint_name(), "memory");
    }

    #[test]
    fn test_handle_from_superseded_simulation_is_invalid() {
        let (mut capture, _) = capture_with_memory();
        let old = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();
        capture.reset_simulation().unwrap();
        let new = capture
            .register_sensor(SensorDefinition::new("cam", "camera"))
            .unwrap();

        assert!(!old.is_valid());
        assert!(new.is_valid());
        assert!(old.report_sensor(Sensor::default()).is_err());
        new.report_sensor(Sensor::default()).unwrap();
    }
}
