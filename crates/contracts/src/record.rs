//! CaptureRecord - scheduler output
//!
//! Finalized records and the lifecycle events an endpoint observes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AnnotationDefinition, MetricDefinition, PendingId, RecordPayload, SensorDefinition};

/// Version of the record schema endpoints stamp into their output
pub const SCHEMA_VERSION: &str = "0.0.1";

/// Version of the capture tooling
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifier of one simulation instance within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimulationId(pub u64);

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sim-{:04}", self.0)
    }
}

/// Metadata sent when a simulation starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationMetadata {
    pub simulation_id: SimulationId,

    pub schema_version: String,

    pub tool_version: String,

    pub started_at: DateTime<Utc>,
}

impl SimulationMetadata {
    pub fn new(simulation_id: SimulationId) -> Self {
        Self {
            simulation_id,
            schema_version: SCHEMA_VERSION.to_string(),
            tool_version: TOOL_VERSION.to_string(),
            started_at: Utc::now(),
        }
    }
}

/// Summary sent when a simulation completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMetadata {
    pub simulation_id: SimulationId,

    /// Frames ticked by the simulation
    pub total_frames: u64,

    /// Sequences started (including the first)
    pub total_sequences: u64,

    /// Records forwarded to the endpoint
    pub records_written: u64,

    /// Futures discarded without a result
    pub futures_abandoned: u64,

    /// Endpoint calls that returned an error
    pub endpoint_failures: u64,

    pub completed_at: DateTime<Utc>,
}

/// Finalized capture record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub simulation_id: SimulationId,

    /// Identity of the finalized work
    pub id: PendingId,

    /// Simulation frame the work was scheduled on
    pub frame: u64,

    /// Simulated seconds since the start of the sequence
    pub timestamp: f64,

    /// Frames between scheduling and resolution (0 for synchronous reports)
    pub latency_frames: u64,

    pub payload: RecordPayload,
}

/// Event observed by a channel-backed endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CaptureEvent {
    SimulationStarted(SimulationMetadata),
    SensorRegistered {
        simulation_id: SimulationId,
        definition: SensorDefinition,
    },
    AnnotationRegistered {
        simulation_id: SimulationId,
        definition: AnnotationDefinition,
    },
    MetricRegistered {
        simulation_id: SimulationId,
        definition: MetricDefinition,
    },
    Record(CaptureRecord),
    SimulationCompleted(CompletionMetadata),
}

impl CaptureEvent {
    pub fn simulation_id(&self) -> SimulationId {
        match self {
            CaptureEvent::SimulationStarted(meta) => meta.simulation_id,
            CaptureEvent::SensorRegistered { simulation_id, .. }
            | CaptureEvent::AnnotationRegistered { simulation_id, .. }
            | CaptureEvent::MetricRegistered { simulation_id, .. } => *simulation_id,
            CaptureEvent::Record(record) => record.simulation_id,
            CaptureEvent::SimulationCompleted(meta) => meta.simulation_id,
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            CaptureEvent::SimulationStarted(_) => "simulation_started",
            CaptureEvent::SensorRegistered { .. } => "sensor_registered",
            CaptureEvent::AnnotationRegistered { .. } => "annotation_registered",
            CaptureEvent::MetricRegistered { .. } => "metric_registered",
            CaptureEvent::Record(_) => "record",
            CaptureEvent::SimulationCompleted(_) => "simulation_completed",
        }
    }
}
