//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{CaptureBlueprint, CaptureTriggerMode};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    endpoint: String,
    sensor_count: usize,
    annotation_count: usize,
    metric_count: usize,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    endpoint: blueprint.endpoint.kind.clone(),
                    sensor_count: blueprint.sensors.len(),
                    annotation_count: blueprint.annotations.len(),
                    metric_count: blueprint.metrics.len(),
                    sink_count: blueprint.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Non-fatal issues
fn collect_warnings(blueprint: &CaptureBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sensors.is_empty() {
        warnings.push("No sensors configured - only global metrics will be captured".to_string());
    }

    if blueprint.endpoint.kind == "dispatch" && blueprint.sinks.is_empty() {
        warnings.push("Endpoint is 'dispatch' but no sinks are configured".to_string());
    }
    if blueprint.endpoint.kind != "dispatch" && !blueprint.sinks.is_empty() {
        warnings.push(format!(
            "Sinks are only used by the 'dispatch' endpoint (endpoint is '{}')",
            blueprint.endpoint.kind
        ));
    }

    for sensor in &blueprint.sensors {
        if sensor.trigger_mode == CaptureTriggerMode::Manual && sensor.capture_interval > 1 {
            warnings.push(format!(
                "Sensor '{}' is manual; capture_interval {} is ignored",
                sensor.id, sensor.capture_interval
            ));
        }
    }

    if blueprint.simulation.future_timeout_frames.is_none() {
        warnings.push(
            "simulation.future_timeout_frames is unset - unresolved futures are kept until shutdown"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Endpoint: {}", summary.endpoint);
            println!("  Sensors: {}", summary.sensor_count);
            println!("  Annotations: {}", summary.annotation_count);
            println!("  Metrics: {}", summary.metric_count);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
