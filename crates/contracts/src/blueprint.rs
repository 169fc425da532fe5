//! CaptureBlueprint - Config Loader output
//!
//! Describes a full capture setup: scheduler tuning, sensors, definitions,
//! endpoint selection and output routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{AnnotationDefinition, MetricDefinition, SensorDefinition};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete capture configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    /// Scheduler tuning
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Sensors registered at startup
    #[serde(default)]
    pub sensors: Vec<SensorDefinition>,

    /// Annotation definitions registered at startup
    #[serde(default)]
    pub annotations: Vec<AnnotationDefinition>,

    /// Metric definitions registered at startup
    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,

    /// Endpoint selection
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Output routing (used by the `dispatch` endpoint)
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Scheduler tuning shared by every simulation the orchestrator creates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Simulated seconds per engine frame
    #[serde(default = "default_frame_delta_time")]
    pub frame_delta_time: f64,

    /// Age after which an unresolved future is discarded (None = never)
    #[serde(default)]
    pub future_timeout_frames: Option<u64>,

    /// Ticks a superseded simulation may wait for outstanding futures
    #[serde(default = "default_shutdown_grace_frames")]
    pub shutdown_grace_frames: u64,
}

fn default_frame_delta_time() -> f64 {
    1.0 / 60.0
}

fn default_shutdown_grace_frames() -> u64 {
    600
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frame_delta_time: default_frame_delta_time(),
            future_timeout_frames: None,
            shutdown_grace_frames: default_shutdown_grace_frames(),
        }
    }
}

/// Endpoint selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Registered endpoint name (`dispatch`, `log`, `none`)
    #[serde(default = "default_endpoint_kind")]
    pub kind: String,
}

fn default_endpoint_kind() -> String {
    "dispatch".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            kind: default_endpoint_kind(),
        }
    }
}

/// Sink output config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    Log,
    File,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_blueprint_uses_defaults() {
        let bp: CaptureBlueprint = serde_json::from_str("{}").unwrap();
        assert_eq!(bp.version, ConfigVersion::V1);
        assert_eq!(bp.simulation, SimulationConfig::default());
        assert_eq!(bp.endpoint.kind, "dispatch");
        assert!(bp.sensors.is_empty());
    }

    #[test]
    fn test_sink_defaults() {
        let sink: SinkConfig =
            serde_json::from_str(r#"{ "name": "out", "sink_type": "file" }"#).unwrap();
        assert_eq!(sink.sink_type, SinkType::File);
        assert_eq!(sink.queue_capacity, 100);
        assert!(sink.params.is_empty());
    }
}
