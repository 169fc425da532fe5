//! Sensor, annotation and metric definitions registered with a simulation.

use serde::{Deserialize, Serialize};

use crate::{AnnotationId, MetricId, SensorId};

/// How a sensor decides which frames to capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTriggerMode {
    /// Capture every `capture_interval` frames starting at `first_capture_frame`
    #[default]
    Scheduled,
    /// Capture only on frames where a capture was requested
    Manual,
}

/// Sensor definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDefinition {
    /// Unique sensor id
    pub id: SensorId,

    /// Sensor modality (e.g., "camera")
    #[serde(default)]
    pub modality: String,

    #[serde(default)]
    pub description: String,

    /// First frame of a sequence on which the sensor captures
    #[serde(default)]
    pub first_capture_frame: u64,

    /// Frames between consecutive captures, must be >= 1
    #[serde(default = "default_capture_interval")]
    pub capture_interval: u32,

    #[serde(default)]
    pub trigger_mode: CaptureTriggerMode,
}

/// Largest accepted `first_capture_frame`
pub const MAX_FIRST_CAPTURE_FRAME: u64 = u32::MAX as u64;

fn default_capture_interval() -> u32 {
    1
}

impl SensorDefinition {
    /// Scheduled sensor capturing every frame
    pub fn new(id: impl Into<SensorId>, modality: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            modality: modality.into(),
            description: String::new(),
            first_capture_frame: 0,
            capture_interval: default_capture_interval(),
            trigger_mode: CaptureTriggerMode::Scheduled,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capture_interval(mut self, frames: u32) -> Self {
        self.capture_interval = frames;
        self
    }

    pub fn with_first_capture_frame(mut self, frame: u64) -> Self {
        self.first_capture_frame = frame;
        self
    }

    pub fn manual(mut self) -> Self {
        self.trigger_mode = CaptureTriggerMode::Manual;
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
            && self.capture_interval >= 1
            && self.first_capture_frame <= MAX_FIRST_CAPTURE_FRAME
    }
}

/// Annotation definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationDefinition {
    pub id: AnnotationId,

    #[serde(default)]
    pub description: String,

    /// Format hint for consumers (e.g., "json", "png")
    #[serde(default)]
    pub format: String,
}

impl AnnotationDefinition {
    pub fn new(id: impl Into<AnnotationId>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            format: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Metric definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: MetricId,

    #[serde(default)]
    pub description: String,
}

impl MetricDefinition {
    pub fn new(id: impl Into<MetricId>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
    }
}
