//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::CaptureBlueprint;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_capture(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if let Some(ref kind) = args.endpoint {
        info!(endpoint = %kind, "Overriding endpoint kind from CLI");
        blueprint.endpoint.kind = kind.clone();
    }

    info!(
        sensors = blueprint.sensors.len(),
        annotations = blueprint.annotations.len(),
        metrics = blueprint.metrics.len(),
        endpoint = %blueprint.endpoint.kind,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        frames: args.frames,
        sequence_length: (args.sequence_length > 0).then_some(args.sequence_length),
        readback_latency: args.readback_latency,
        shutdown_ticks: args.shutdown_ticks,
        buffer_size: args.buffer_size.max(1),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
        seed: args.seed,
    };

    let pipeline = Pipeline::new(pipeline_config);
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting capture...");

    tokio::select! {
        result = pipeline.run() => {
            let stats = result.context("Capture run failed")?;
            info!(
                frames = stats.frames,
                records = stats.metrics.total_records,
                duration_secs = stats.duration.as_secs_f64(),
                "Capture completed"
            );
            stats.print_summary();
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping capture...");
        }
    }

    info!("capture-sim finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &CaptureBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Simulation:");
    println!("  Frame delta: {}s", blueprint.simulation.frame_delta_time);
    match blueprint.simulation.future_timeout_frames {
        Some(frames) => println!("  Future timeout: {frames} frames"),
        None => println!("  Future timeout: none"),
    }
    println!(
        "  Shutdown grace: {} frames",
        blueprint.simulation.shutdown_grace_frames
    );

    println!("\nSensors ({}):", blueprint.sensors.len());
    for sensor in &blueprint.sensors {
        println!(
            "  - {} ({}) every {} frames from {} [{:?}]",
            sensor.id,
            sensor.modality,
            sensor.capture_interval,
            sensor.first_capture_frame,
            sensor.trigger_mode
        );
    }

    println!("\nEndpoint: {}", blueprint.endpoint.kind);
    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
