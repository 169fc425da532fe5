//! Simulation state machine
//!
//! One `SimulationState` owns the sensor schedules, registered definitions,
//! outstanding futures and the consumer endpoint of a single simulation.
//! It is advanced by the orchestrator once per host frame.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::Utc;
use contracts::{
    AnnotationDefinition, AnnotationId, CaptureRecord, CompletionMetadata, ConsumerEndpoint,
    ContractError, MetricDefinition, MetricId, PendingId, RecordPayload, SensorDefinition,
    SensorId, SimulationConfig, SimulationId, SimulationMetadata,
};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{CaptureError, Result};
use crate::schedule::SensorSchedule;

/// Shared ownership of one simulation
pub type SharedSimulation = Rc<RefCell<SimulationState>>;

/// Lifecycle of a simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Created, nothing registered or reported yet
    NotStarted,
    /// Accepting registrations and reports
    Running,
    /// Superseded; waits for the next tick to begin draining
    Ending,
    /// Draining outstanding futures and waiting for the endpoint
    ShuttingDown,
    /// Terminal
    Complete,
}

/// Counters kept per simulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationStats {
    /// Records handed to the endpoint without error
    pub records_written: u64,
    /// Futures discarded without a result
    pub futures_abandoned: u64,
    /// Endpoint calls that returned an error
    pub endpoint_failures: u64,
    /// Frames on which some sensor was due
    pub sensor_captures: u64,
}

#[derive(Debug, Clone, Copy)]
struct SequenceSpan {
    sequence: u64,
    start_frame: u64,
}

#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    frame: u64,
    timestamp: f64,
}

pub struct SimulationState {
    id: SimulationId,
    config: SimulationConfig,
    endpoint: Box<dyn ConsumerEndpoint>,
    state: ExecutionState,
    /// Frame currently being captured
    frame: u64,
    /// Sequence boundaries, in order; never empty
    sequences: Vec<SequenceSpan>,
    sensors: HashMap<SensorId, SensorSchedule>,
    annotation_definitions: HashMap<AnnotationId, AnnotationDefinition>,
    metric_definitions: HashMap<MetricId, MetricDefinition>,
    pending: HashMap<PendingId, PendingEntry>,
    /// Ids finalized during the current frame, for duplicate detection
    resolved_this_frame: HashSet<PendingId>,
    ended_at_frame: Option<u64>,
    stats: SimulationStats,
}

impl fmt::Debug for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationState")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint.name())
            .field("state", &self.state)
            .field("frame", &self.frame)
            .field("sequence", &self.sequence())
            .field("sensors", &self.sensors.len())
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl SimulationState {
    pub fn new(
        id: SimulationId,
        config: SimulationConfig,
        endpoint: Box<dyn ConsumerEndpoint>,
    ) -> Self {
        Self {
            id,
            config,
            endpoint,
            state: ExecutionState::NotStarted,
            frame: 0,
            sequences: vec![SequenceSpan {
                sequence: 0,
                start_frame: 0,
            }],
            sensors: HashMap::new(),
            annotation_definitions: HashMap::new(),
            metric_definitions: HashMap::new(),
            pending: HashMap::new(),
            resolved_this_frame: HashSet::new(),
            ended_at_frame: None,
            stats: SimulationStats::default(),
        }
    }

    pub fn into_shared(self) -> SharedSimulation {
        Rc::new(RefCell::new(self))
    }

    pub fn id(&self) -> SimulationId {
        self.id
    }

    pub fn endpoint_name(&self) -> &str {
        self.endpoint.name()
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ExecutionState::Running
    }

    /// Not started yet, or already complete
    pub fn is_not_running(&self) -> bool {
        matches!(
            self.state,
            ExecutionState::NotStarted | ExecutionState::Complete
        )
    }

    pub fn is_complete(&self) -> bool {
        self.state == ExecutionState::Complete
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn sequence(&self) -> u64 {
        self.current_span().sequence
    }

    /// Sequences numbered so far, including ones replaced before their first step
    pub fn sequence_count(&self) -> u64 {
        self.sequence() + 1
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    fn current_span(&self) -> SequenceSpan {
        self.sequences.last().copied().unwrap_or(SequenceSpan {
            sequence: 0,
            start_frame: 0,
        })
    }

    /// Map a frame to the `(sequence, step)` it belongs to.
    ///
    /// Frames before the first boundary map to sequence 0.
    pub fn sequence_and_step_from_frame(&self, frame: u64) -> (u64, u64) {
        let span = self
            .sequences
            .iter()
            .rev()
            .find(|span| span.start_frame <= frame)
            .copied()
            .unwrap_or(SequenceSpan {
                sequence: 0,
                start_frame: 0,
            });
        (span.sequence, frame - span.start_frame.min(frame))
    }

    pub fn current_sequence_and_step(&self) -> (u64, u64) {
        self.sequence_and_step_from_frame(self.frame)
    }

    fn timestamp_of(&self, frame: u64) -> f64 {
        let (_, step) = self.sequence_and_step_from_frame(frame);
        step as f64 * self.config.frame_delta_time
    }

    /// Swap the endpoint of a simulation that has not produced output yet
    pub(crate) fn replace_endpoint(&mut self, endpoint: Box<dyn ConsumerEndpoint>) -> bool {
        if self.state != ExecutionState::NotStarted {
            return false;
        }
        self.endpoint = endpoint;
        true
    }

    /// Registrations and new work are accepted before the simulation ends
    fn check_accepts_work(&self, action: &str) -> Result<()> {
        match self.state {
            ExecutionState::NotStarted | ExecutionState::Running => Ok(()),
            state => Err(CaptureError::invalid_operation(format!(
                "cannot {action}: simulation {} is {state:?}",
                self.id
            ))),
        }
    }

    fn ensure_started(&mut self) {
        if self.state != ExecutionState::NotStarted {
            return;
        }
        self.state = ExecutionState::Running;
        info!(
            simulation_id = %self.id,
            endpoint = self.endpoint.name(),
            "Simulation started"
        );
        let metadata = SimulationMetadata::new(self.id);
        let result = self.endpoint.simulation_started(&metadata);
        self.track_endpoint_result("simulation_started", result);
    }

    fn track_endpoint_result(&mut self, call: &str, result: std::result::Result<(), ContractError>) {
        if let Err(err) = result {
            self.stats.endpoint_failures += 1;
            observability::metrics::record_endpoint_failure(self.endpoint.name());
            error!(
                simulation_id = %self.id,
                endpoint = self.endpoint.name(),
                call,
                error = %err,
                "Endpoint call failed"
            );
        }
    }

    // ===== Sensors =====

    /// Register a sensor, or replace the definition of an already registered one
    #[instrument(level = "debug", skip(self, definition), fields(simulation_id = %self.id, sensor_id = %definition.id))]
    pub fn add_sensor(&mut self, definition: SensorDefinition) -> Result<()> {
        if !definition.is_valid() {
            return Err(CaptureError::invalid_argument(format!(
                "sensor definition '{}' needs a non-empty id, capture_interval >= 1 and first_capture_frame <= {}",
                definition.id,
                contracts::MAX_FIRST_CAPTURE_FRAME
            )));
        }
        self.check_accepts_work("register a sensor")?;
        self.ensure_started();

        let sequence_start = self.current_span().start_frame;
        match self.sensors.get_mut(&definition.id) {
            Some(schedule) => {
                debug!("Replacing sensor definition");
                schedule.redefine(definition.clone(), sequence_start, self.frame);
            }
            None => {
                self.sensors.insert(
                    definition.id.clone(),
                    SensorSchedule::new(definition.clone(), sequence_start, self.frame),
                );
            }
        }

        let result = self.endpoint.sensor_registered(&definition);
        self.track_endpoint_result("sensor_registered", result);
        Ok(())
    }

    pub fn contains(&self, sensor_id: &str) -> bool {
        self.sensors.contains_key(sensor_id)
    }

    pub fn sensor_definition(&self, sensor_id: &str) -> Option<&SensorDefinition> {
        self.sensors.get(sensor_id).map(SensorSchedule::definition)
    }

    pub fn sensor_captures(&self, sensor_id: &str) -> u64 {
        self.sensors
            .get(sensor_id)
            .map(SensorSchedule::captures)
            .unwrap_or(0)
    }

    pub fn is_enabled(&self, sensor_id: &str) -> bool {
        self.sensors
            .get(sensor_id)
            .is_some_and(SensorSchedule::enabled)
    }

    pub fn set_enabled(&mut self, sensor_id: &str, enabled: bool) -> Result<()> {
        self.check_accepts_work("change sensor state")?;
        let frame = self.frame;
        let schedule = self.sensors.get_mut(sensor_id).ok_or_else(|| {
            CaptureError::invalid_operation(format!("sensor '{sensor_id}' is not registered"))
        })?;
        schedule.set_enabled(enabled, frame);
        Ok(())
    }

    pub fn should_capture_this_frame(&self, sensor_id: &str) -> bool {
        self.is_running()
            && self
                .sensors
                .get(sensor_id)
                .is_some_and(|schedule| schedule.is_due(self.frame))
    }

    /// Ask a manually triggered sensor to capture on the current frame
    pub fn request_capture(&mut self, sensor_id: &str) -> Result<()> {
        self.check_accepts_work("request a capture")?;
        let frame = self.frame;
        let schedule = self.sensors.get_mut(sensor_id).ok_or_else(|| {
            CaptureError::invalid_operation(format!("sensor '{sensor_id}' is not registered"))
        })?;
        if !schedule.is_manual() {
            return Err(CaptureError::invalid_operation(format!(
                "sensor '{sensor_id}' is scheduled; only manual sensors accept capture requests"
            )));
        }
        schedule.request_capture(frame);
        Ok(())
    }

    // ===== Definitions =====

    #[instrument(level = "debug", skip(self, definition), fields(simulation_id = %self.id, metric_id = %definition.id))]
    pub fn register_metric(&mut self, definition: MetricDefinition) -> Result<()> {
        if !definition.is_valid() {
            return Err(CaptureError::invalid_argument(
                "metric definition needs a non-empty id",
            ));
        }
        self.check_accepts_work("register a metric")?;
        self.ensure_started();

        let result = self.endpoint.metric_registered(&definition);
        self.track_endpoint_result("metric_registered", result);
        self.metric_definitions
            .insert(definition.id.clone(), definition);
        Ok(())
    }

    #[instrument(level = "debug", skip(self, definition), fields(simulation_id = %self.id, annotation_id = %definition.id))]
    pub fn register_annotation_definition(&mut self, definition: AnnotationDefinition) -> Result<()> {
        if !definition.is_valid() {
            return Err(CaptureError::invalid_argument(
                "annotation definition needs a non-empty id",
            ));
        }
        self.check_accepts_work("register an annotation definition")?;
        self.ensure_started();

        let result = self.endpoint.annotation_registered(&definition);
        self.track_endpoint_result("annotation_registered", result);
        self.annotation_definitions
            .insert(definition.id.clone(), definition);
        Ok(())
    }

    pub fn is_metric_registered(&self, metric_id: &str) -> bool {
        self.metric_definitions.contains_key(metric_id)
    }

    pub fn is_annotation_registered(&self, annotation_id: &str) -> bool {
        self.annotation_definitions.contains_key(annotation_id)
    }

    // ===== Sequences =====

    /// Start a new sequence at the current frame.
    ///
    /// Scheduled sensors restart their grid from the new boundary.
    #[instrument(level = "debug", skip(self), fields(simulation_id = %self.id, frame = self.frame))]
    pub fn start_new_sequence(&mut self) -> Result<()> {
        self.check_accepts_work("start a new sequence")?;
        self.ensure_started();

        let sequence = self.sequence() + 1;
        let start_frame = self.frame;
        self.sequences.retain(|span| span.start_frame < start_frame);
        self.sequences.push(SequenceSpan {
            sequence,
            start_frame,
        });
        for schedule in self.sensors.values_mut() {
            schedule.realign(start_frame, start_frame);
        }
        debug!(sequence, "Sequence started");
        Ok(())
    }

    // ===== Reports =====

    fn check_report(&self, id: &PendingId, payload: Option<&RecordPayload>) -> Result<()> {
        if !id.is_valid() {
            return Err(CaptureError::invalid_argument(format!(
                "pending id {id} is missing a required identifier"
            )));
        }
        if let Some(payload) = payload {
            if payload.kind() != id.kind() {
                return Err(CaptureError::invalid_argument(format!(
                    "{} payload cannot resolve pending id {id}",
                    payload.kind()
                )));
            }
        }
        if self.pending.contains_key(id) || self.resolved_this_frame.contains(id) {
            return Err(CaptureError::invalid_operation(format!(
                "{id} has already been reported"
            )));
        }
        Ok(())
    }

    /// Finalize a result for the current frame
    #[instrument(level = "trace", skip(self, payload), fields(simulation_id = %self.id, id = %id))]
    pub fn report(&mut self, id: PendingId, payload: RecordPayload) -> Result<()> {
        self.check_accepts_work("report a result")?;
        self.check_report(&id, Some(&payload))?;
        self.ensure_started();

        let frame = self.frame;
        let timestamp = self.timestamp_of(frame);
        self.resolved_this_frame.insert(id.clone());
        self.finalize(id, frame, timestamp, payload);
        Ok(())
    }

    /// Register an outstanding unit of work for the current frame
    #[instrument(level = "trace", skip(self), fields(simulation_id = %self.id, id = %id))]
    pub fn begin_async(&mut self, id: PendingId) -> Result<()> {
        self.check_accepts_work("start an asynchronous report")?;
        self.check_report(&id, None)?;
        self.ensure_started();

        let frame = self.frame;
        let timestamp = self.timestamp_of(frame);
        self.pending.insert(id, PendingEntry { frame, timestamp });
        observability::metrics::record_pending_futures(self.pending.len());
        Ok(())
    }

    pub fn is_pending(&self, id: &PendingId) -> bool {
        self.pending.contains_key(id)
    }

    /// Resolve an outstanding unit of work.
    ///
    /// Allowed while the simulation is running or draining.
    #[instrument(level = "trace", skip(self, payload), fields(simulation_id = %self.id, id = %id))]
    pub fn resolve_async(&mut self, id: &PendingId, payload: RecordPayload) -> Result<()> {
        if matches!(
            self.state,
            ExecutionState::NotStarted | ExecutionState::Complete
        ) {
            return Err(CaptureError::invalid_operation(format!(
                "cannot resolve {id}: simulation {} is {:?}",
                self.id, self.state
            )));
        }
        if payload.kind() != id.kind() {
            return Err(CaptureError::invalid_argument(format!(
                "{} payload cannot resolve pending id {id}",
                payload.kind()
            )));
        }
        let entry = self.pending.remove(id).ok_or_else(|| {
            CaptureError::invalid_operation(format!("{id} is not pending"))
        })?;

        self.resolved_this_frame.insert(id.clone());
        self.finalize(id.clone(), entry.frame, entry.timestamp, payload);
        observability::metrics::record_pending_futures(self.pending.len());
        Ok(())
    }

    fn finalize(&mut self, id: PendingId, frame: u64, timestamp: f64, payload: RecordPayload) {
        let latency_frames = self.frame - frame.min(self.frame);
        let kind = id.kind();
        let record = CaptureRecord {
            simulation_id: self.id,
            id,
            frame,
            timestamp,
            latency_frames,
            payload,
        };

        let result = self.endpoint.record_finalized(record);
        if result.is_ok() {
            self.stats.records_written += 1;
            observability::metrics::record_record_finalized(kind, latency_frames);
        }
        self.track_endpoint_result("record_finalized", result);
    }

    // ===== Ticking =====

    /// Close the current frame and advance to the next one
    #[instrument(level = "trace", name = "simulation_update", skip(self), fields(simulation_id = %self.id, frame = self.frame))]
    pub fn update(&mut self) {
        match self.state {
            ExecutionState::NotStarted | ExecutionState::Complete => return,
            ExecutionState::Running => self.close_frame(),
            ExecutionState::Ending => {
                self.state = ExecutionState::ShuttingDown;
                debug!(pending = self.pending.len(), "Simulation draining");
            }
            ExecutionState::ShuttingDown => {}
        }

        self.age_out_futures();
        self.resolved_this_frame.clear();
        self.frame += 1;

        if self.state == ExecutionState::ShuttingDown {
            self.try_complete();
        }
    }

    fn close_frame(&mut self) {
        let frame = self.frame;
        for schedule in self.sensors.values_mut() {
            if schedule.close_frame(frame) {
                self.stats.sensor_captures += 1;
            }
        }
    }

    fn age_out_futures(&mut self) {
        let Some(timeout) = self.config.future_timeout_frames else {
            return;
        };
        let frame = self.frame;
        let expired: Vec<PendingId> = self
            .pending
            .iter()
            .filter(|(_, entry)| frame.saturating_sub(entry.frame) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();
        if expired.is_empty() {
            return;
        }

        for id in &expired {
            self.pending.remove(id);
            warn!(simulation_id = %self.id, id = %id, timeout, "Future timed out without a result");
        }
        self.stats.futures_abandoned += expired.len() as u64;
        observability::metrics::record_future_abandoned(expired.len() as u64);
        observability::metrics::record_pending_futures(self.pending.len());
    }

    fn try_complete(&mut self) {
        let waited = self
            .frame
            .saturating_sub(self.ended_at_frame.unwrap_or(self.frame));
        if self.pending.is_empty() && self.endpoint.is_complete() {
            self.complete();
        } else if waited >= self.config.shutdown_grace_frames {
            warn!(
                simulation_id = %self.id,
                pending = self.pending.len(),
                waited,
                "Shutdown grace period exceeded; discarding outstanding futures"
            );
            self.discard_pending();
            self.complete();
        }
    }

    fn discard_pending(&mut self) {
        let discarded = self.pending.len() as u64;
        if discarded == 0 {
            return;
        }
        self.pending.clear();
        self.stats.futures_abandoned += discarded;
        observability::metrics::record_future_abandoned(discarded);
    }

    fn complete(&mut self) {
        self.state = ExecutionState::Complete;

        let summary = CompletionMetadata {
            simulation_id: self.id,
            total_frames: self.frame,
            total_sequences: self.sequence_count(),
            records_written: self.stats.records_written,
            futures_abandoned: self.stats.futures_abandoned,
            endpoint_failures: self.stats.endpoint_failures,
            completed_at: Utc::now(),
        };

        let result = self.endpoint.simulation_completed(&summary);
        self.track_endpoint_result("simulation_completed", result);
        observability::metrics::record_simulation_completed(&summary);

        info!(
            simulation_id = %self.id,
            frames = summary.total_frames,
            records = summary.records_written,
            abandoned = summary.futures_abandoned,
            endpoint_failures = summary.endpoint_failures,
            "Simulation complete"
        );
    }

    /// Stop accepting new work; outstanding futures drain on later ticks.
    ///
    /// A simulation that never started completes immediately.
    pub fn end(&mut self) {
        match self.state {
            ExecutionState::NotStarted => {
                self.state = ExecutionState::Complete;
            }
            ExecutionState::Running => {
                self.state = ExecutionState::Ending;
                self.ended_at_frame = Some(self.frame);
                info!(
                    simulation_id = %self.id,
                    frame = self.frame,
                    pending = self.pending.len(),
                    "Simulation ending"
                );
            }
            _ => {}
        }
    }

    /// Discard everything outstanding and complete now
    pub fn force_complete(&mut self) {
        match self.state {
            ExecutionState::Complete => {}
            ExecutionState::NotStarted => self.state = ExecutionState::Complete,
            _ => {
                self.discard_pending();
                self.complete();
            }
        }
    }
}

/// Non-owning reference from handles and futures to their simulation
#[derive(Clone, Default)]
pub(crate) struct SimulationRef(Weak<RefCell<SimulationState>>);

impl fmt::Debug for SimulationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.read(SimulationState::id) {
            Some(id) => write!(f, "SimulationRef({id})"),
            None => f.write_str("SimulationRef(<gone>)"),
        }
    }
}

impl SimulationRef {
    pub fn new(simulation: &SharedSimulation) -> Self {
        Self(Rc::downgrade(simulation))
    }

    pub fn read<R>(&self, f: impl FnOnce(&SimulationState) -> R) -> Option<R> {
        let simulation = self.0.upgrade()?;
        let state = simulation.try_borrow().ok()?;
        Some(f(&state))
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut SimulationState) -> Result<R>) -> Result<R> {
        let simulation = self
            .0
            .upgrade()
            .ok_or_else(CaptureError::simulation_unavailable)?;
        let mut state = simulation.try_borrow_mut().map_err(|_| {
            CaptureError::invalid_operation("simulation is busy; capture calls cannot re-enter")
        })?;
        f(&mut state)
    }
}
