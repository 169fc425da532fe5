//! Config validation
//!
//! Rules:
//! - frame_delta_time is finite and > 0, future_timeout_frames >= 1 when set
//! - sensor, annotation and metric ids are non-empty and unique per kind
//! - capture_interval >= 1, first_capture_frame within MAX_FIRST_CAPTURE_FRAME
//! - endpoint kind is set
//! - sink names are non-empty and unique, queue_capacity >= 1

use std::collections::HashSet;

use contracts::{CaptureBlueprint, ContractError, MAX_FIRST_CAPTURE_FRAME};

/// Validate a CaptureBlueprint
///
/// Returns the first error encountered.
pub fn validate(blueprint: &CaptureBlueprint) -> Result<(), ContractError> {
    validate_simulation(blueprint)?;
    validate_sensors(blueprint)?;
    validate_definition_ids(
        "annotations",
        blueprint.annotations.iter().map(|a| a.id.as_str()),
    )?;
    validate_definition_ids("metrics", blueprint.metrics.iter().map(|m| m.id.as_str()))?;
    validate_endpoint(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

fn validate_simulation(blueprint: &CaptureBlueprint) -> Result<(), ContractError> {
    let sim = &blueprint.simulation;

    if !sim.frame_delta_time.is_finite() || sim.frame_delta_time <= 0.0 {
        return Err(ContractError::config_validation(
            "simulation.frame_delta_time",
            format!("frame_delta_time must be > 0, got {}", sim.frame_delta_time),
        ));
    }

    if sim.future_timeout_frames == Some(0) {
        return Err(ContractError::config_validation(
            "simulation.future_timeout_frames",
            "future_timeout_frames must be >= 1 when set",
        ));
    }

    Ok(())
}

fn validate_sensors(blueprint: &CaptureBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sensor) in blueprint.sensors.iter().enumerate() {
        if sensor.id.is_empty() {
            return Err(ContractError::config_validation(
                format!("sensors[{idx}].id"),
                "sensor id cannot be empty",
            ));
        }
        if !seen.insert(sensor.id.as_str()) {
            return Err(ContractError::config_validation(
                format!("sensors[id={}]", sensor.id),
                "duplicate sensor id",
            ));
        }
        if sensor.capture_interval == 0 {
            return Err(ContractError::config_validation(
                format!("sensors[{}].capture_interval", sensor.id),
                "capture_interval must be >= 1",
            ));
        }
        if sensor.first_capture_frame > MAX_FIRST_CAPTURE_FRAME {
            return Err(ContractError::config_validation(
                format!("sensors[{}].first_capture_frame", sensor.id),
                format!("first_capture_frame must be <= {MAX_FIRST_CAPTURE_FRAME}"),
            ));
        }
    }
    Ok(())
}

fn validate_definition_ids<'a>(
    section: &str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, id) in ids.enumerate() {
        if id.is_empty() {
            return Err(ContractError::config_validation(
                format!("{section}[{idx}].id"),
                "id cannot be empty",
            ));
        }
        if !seen.insert(id) {
            return Err(ContractError::config_validation(
                format!("{section}[id={id}]"),
                "duplicate id",
            ));
        }
    }
    Ok(())
}

fn validate_endpoint(blueprint: &CaptureBlueprint) -> Result<(), ContractError> {
    if blueprint.endpoint.kind.trim().is_empty() {
        return Err(ContractError::config_validation(
            "endpoint.kind",
            "endpoint kind cannot be empty",
        ));
    }
    Ok(())
}

fn validate_sinks(blueprint: &CaptureBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be >= 1",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        AnnotationDefinition, MetricDefinition, SensorDefinition, SinkConfig, SinkType,
    };

    fn minimal_blueprint() -> CaptureBlueprint {
        CaptureBlueprint {
            sensors: vec![
                SensorDefinition::new("cam1", "camera"),
                SensorDefinition::new("lidar", "lidar").with_capture_interval(5),
            ],
            annotations: vec![AnnotationDefinition::new("bbox2d")],
            metrics: vec![MetricDefinition::new("object_count")],
            sinks: vec![SinkConfig {
                name: "log".into(),
                sink_type: SinkType::Log,
                queue_capacity: 100,
                params: Default::default(),
            }],
            ..Default::default()
        }
    }

    fn validation_error(bp: &CaptureBlueprint) -> String {
        validate(bp).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_blueprint()).is_ok());
        assert!(validate(&CaptureBlueprint::default()).is_ok());
    }

    #[test]
    fn test_duplicate_sensor_id() {
        let mut bp = minimal_blueprint();
        bp.sensors.push(SensorDefinition::new("cam1", "depth"));
        let err = validation_error(&bp);
        assert!(err.contains("duplicate sensor id"), "got: {err}");
    }

    #[test]
    fn test_empty_sensor_id() {
        let mut bp = minimal_blueprint();
        bp.sensors[1].id = "".into();
        let err = validation_error(&bp);
        assert!(err.contains("sensors[1].id"), "got: {err}");
    }

    #[test]
    fn test_zero_capture_interval() {
        let mut bp = minimal_blueprint();
        bp.sensors[0].capture_interval = 0;
        let err = validation_error(&bp);
        assert!(err.contains("capture_interval must be >= 1"), "got: {err}");
    }

    #[test]
    fn test_first_capture_frame_out_of_range() {
        let mut bp = minimal_blueprint();
        bp.sensors[1].first_capture_frame = u64::MAX;
        let err = validation_error(&bp);
        assert!(err.contains("sensors[lidar].first_capture_frame"), "got: {err}");
    }

    #[test]
    fn test_duplicate_annotation_and_metric_ids() {
        let mut bp = minimal_blueprint();
        bp.annotations.push(AnnotationDefinition::new("bbox2d"));
        let err = validation_error(&bp);
        assert!(err.contains("annotations[id=bbox2d]"), "got: {err}");

        let mut bp = minimal_blueprint();
        bp.metrics.push(MetricDefinition::new("object_count"));
        let err = validation_error(&bp);
        assert!(err.contains("metrics[id=object_count]"), "got: {err}");
    }

    #[test]
    fn test_same_id_across_kinds_is_allowed() {
        let mut bp = minimal_blueprint();
        bp.metrics.push(MetricDefinition::new("cam1"));
        bp.annotations.push(AnnotationDefinition::new("cam1"));
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_invalid_frame_delta_time() {
        let mut bp = minimal_blueprint();
        bp.simulation.frame_delta_time = 0.0;
        let err = validation_error(&bp);
        assert!(err.contains("frame_delta_time must be > 0"), "got: {err}");

        bp.simulation.frame_delta_time = f64::NAN;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_zero_future_timeout() {
        let mut bp = minimal_blueprint();
        bp.simulation.future_timeout_frames = Some(0);
        let err = validation_error(&bp);
        assert!(err.contains("future_timeout_frames"), "got: {err}");
    }

    #[test]
    fn test_empty_endpoint_kind() {
        let mut bp = minimal_blueprint();
        bp.endpoint.kind = "  ".into();
        let err = validation_error(&bp);
        assert!(err.contains("endpoint.kind"), "got: {err}");
    }

    #[test]
    fn test_empty_sink_name() {
        let mut bp = minimal_blueprint();
        bp.sinks[0].name = String::new();
        let err = validation_error(&bp);
        assert!(err.contains("cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_duplicate_sink_name_and_zero_capacity() {
        let mut bp = minimal_blueprint();
        bp.sinks.push(bp.sinks[0].clone());
        let err = validation_error(&bp);
        assert!(err.contains("duplicate sink name"), "got: {err}");

        let mut bp = minimal_blueprint();
        bp.sinks[0].queue_capacity = 0;
        let err = validation_error(&bp);
        assert!(err.contains("queue_capacity"), "got: {err}");
    }
}
