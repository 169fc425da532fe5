//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::CaptureBlueprint;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    simulation: SimulationInfo,
    endpoint: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sensors: Vec<SensorInfo>,
    annotations: Vec<String>,
    metrics: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SimulationInfo {
    frame_delta_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    future_timeout_frames: Option<u64>,
    shutdown_grace_frames: u64,
}

#[derive(Serialize)]
struct SensorInfo {
    id: String,
    modality: String,
    trigger_mode: String,
    first_capture_frame: u64,
    capture_interval: u32,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &CaptureBlueprint, args: &InfoArgs) -> ConfigInfo {
    let sensors = if args.sensors {
        blueprint
            .sensors
            .iter()
            .map(|s| SensorInfo {
                id: s.id.to_string(),
                modality: s.modality.clone(),
                trigger_mode: format!("{:?}", s.trigger_mode),
                first_capture_frame: s.first_capture_frame,
                capture_interval: s.capture_interval,
            })
            .collect()
    } else {
        Vec::new()
    };

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        simulation: SimulationInfo {
            frame_delta_time: blueprint.simulation.frame_delta_time,
            future_timeout_frames: blueprint.simulation.future_timeout_frames,
            shutdown_grace_frames: blueprint.simulation.shutdown_grace_frames,
        },
        endpoint: blueprint.endpoint.kind.clone(),
        sensors,
        annotations: blueprint.annotations.iter().map(|a| a.id.to_string()).collect(),
        metrics: blueprint.metrics.iter().map(|m| m.id.to_string()).collect(),
        sinks,
    }
}

fn tree_prefix(index: usize, len: usize) -> &'static str {
    if index + 1 == len {
        "└─"
    } else {
        "├─"
    }
}

fn print_config_info(blueprint: &CaptureBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Capture Configuration                          ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let sim = &blueprint.simulation;
    println!("⏱  Simulation");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Frame delta: {}s", sim.frame_delta_time);
    match sim.future_timeout_frames {
        Some(frames) => println!("   ├─ Future timeout: {} frames", frames),
        None => println!("   ├─ Future timeout: none"),
    }
    println!("   └─ Shutdown grace: {} frames", sim.shutdown_grace_frames);

    println!("\n📷 Sensors ({})", blueprint.sensors.len());
    if args.sensors {
        for (i, sensor) in blueprint.sensors.iter().enumerate() {
            println!(
                "   {} {} ({}, {:?}, every {} from {})",
                tree_prefix(i, blueprint.sensors.len()),
                sensor.id,
                sensor.modality,
                sensor.trigger_mode,
                sensor.capture_interval,
                sensor.first_capture_frame
            );
        }
    } else if !blueprint.sensors.is_empty() {
        println!("   └─ (use --sensors for details)");
    }

    println!("\n🏷  Definitions");
    println!("   ├─ Annotations: {}", blueprint.annotations.len());
    println!("   └─ Metrics: {}", blueprint.metrics.len());

    println!("\n📤 Endpoint: {}", blueprint.endpoint.kind);
    if args.sinks && !blueprint.sinks.is_empty() {
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            println!(
                "   {} {} ({:?}, queue {})",
                tree_prefix(i, blueprint.sinks.len()),
                sink.name,
                sink.sink_type,
                sink.queue_capacity
            );
        }
    } else {
        println!("   └─ {} sinks", blueprint.sinks.len());
    }

    println!();
}
