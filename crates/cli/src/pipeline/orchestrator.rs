//! Pipeline orchestrator - wires the host loop to the dispatcher.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::CaptureBlueprint;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::host::{run_host, DISPATCH_ENDPOINT};
use super::PipelineStats;
use crate::error::CliError;

const DISPATCHER_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub blueprint: CaptureBlueprint,

    /// Host frames to simulate
    pub frames: u64,

    /// Frames per sequence (None = one sequence)
    pub sequence_length: Option<u64>,

    /// Base readback latency for async annotations, in frames
    pub readback_latency: u64,

    /// Bound on drain ticks after the shutdown hook
    pub shutdown_ticks: u64,

    /// Endpoint-to-dispatcher channel capacity
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Seed for simulated sensor data (None = OS entropy)
    pub seed: Option<u64>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the host loop to completion and wait for the sinks to flush
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let (dispatch_tx, dispatcher_handle) = if blueprint.endpoint.kind == DISPATCH_ENDPOINT {
            if blueprint.sinks.is_empty() {
                warn!("No sinks configured - capture records will be dropped");
            }
            let (tx, rx) = mpsc::channel(self.config.buffer_size);
            let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), rx)
                .await
                .map_err(CliError::from)
                .context("Failed to create dispatcher")?;
            info!(sinks = blueprint.sinks.len(), "Dispatcher started");
            (Some(tx), Some(dispatcher.spawn()))
        } else {
            (None, None)
        };

        // DatasetCapture is single-threaded; the host loop owns it on a blocking thread
        let config = self.config.clone();
        let host = tokio::task::spawn_blocking(move || run_host(&config, dispatch_tx))
            .await
            .map_err(|e| CliError::host_loop(e.to_string()))??;

        let dispatch = match dispatcher_handle {
            Some(handle) => match tokio::time::timeout(DISPATCHER_FLUSH_TIMEOUT, handle).await {
                Ok(Ok(report)) => Some(report),
                Ok(Err(e)) => {
                    warn!(error = %e, "Dispatcher task failed");
                    None
                }
                Err(_) => {
                    warn!(
                        timeout_secs = DISPATCHER_FLUSH_TIMEOUT.as_secs(),
                        "Timed out waiting for sinks to flush"
                    );
                    None
                }
            },
            None => None,
        };

        let stats = PipelineStats {
            frames: host.frames,
            sequences: host.sequences,
            simulations_ended: host.simulations_ended,
            captures: host.captures,
            readbacks_resolved: host.readbacks_resolved,
            report_errors: host.report_errors,
            shutdown: host.shutdown,
            metrics: host.metrics,
            dispatch,
            duration: start_time.elapsed(),
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            fps = format!("{:.2}", stats.fps()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}
