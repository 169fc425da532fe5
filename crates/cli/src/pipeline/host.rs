//! Synthetic host loop
//!
//! Plays the role of the engine: polls sensors once per frame, reports
//! captures, starts readbacks that land a few frames later and ticks the
//! scheduler. Runs on a blocking thread because the scheduler is `!Send`.

use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use capture_engine::{AsyncFuture, DatasetCapture, EndpointFactory, SensorHandle, ShutdownReport};
use contracts::{
    Annotation, AnnotationDefinition, CaptureEvent, CaptureTriggerMode, ImageData, ImageFormat,
    Metric, MetricDefinition, Sensor, SensorDefinition, Value,
};
use dispatcher::{ChannelEndpoint, SendMode};
use observability::{CaptureMetricsAggregator, MetricsSummary};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::recording::RecordingEndpoint;
use super::PipelineConfig;
use crate::error::{CliError, Result};

/// Registry name of the channel endpoint feeding the dispatcher
pub const DISPATCH_ENDPOINT: &str = "dispatch";

const IMAGE_WIDTH: u32 = 16;
const IMAGE_HEIGHT: u32 = 12;
const MANUAL_CAPTURE_PROBABILITY: f64 = 0.25;
const DRAIN_PACING: Duration = Duration::from_millis(1);

/// What the host loop did
#[derive(Debug, Clone, Default)]
pub struct HostReport {
    pub frames: u64,
    pub sequences: u64,
    pub simulations_ended: u64,
    pub captures: u64,
    pub readbacks_resolved: u64,
    pub report_errors: u64,
    pub shutdown: ShutdownReport,
    pub metrics: MetricsSummary,
}

struct SimulatedSensor {
    handle: SensorHandle,
    camera: bool,
    manual: bool,
}

struct Readback {
    future: AsyncFuture<Annotation>,
    ready_at: u64,
}

struct Host {
    capture: DatasetCapture,
    sensors: Vec<SimulatedSensor>,
    annotations: Vec<AnnotationDefinition>,
    metrics: Vec<MetricDefinition>,
    readbacks: Vec<Readback>,
    rng: StdRng,
    readback_latency: u64,
    frame_delta_time: f64,
    report: HostReport,
}

/// Run the configured number of frames, then shut down and drain
#[instrument(name = "host_loop", skip_all, fields(frames = config.frames))]
pub fn run_host(
    config: &PipelineConfig,
    dispatch_tx: Option<mpsc::Sender<CaptureEvent>>,
) -> Result<HostReport> {
    let blueprint = &config.blueprint;
    let mut capture = DatasetCapture::new(blueprint.simulation.clone());
    let aggregator = Rc::new(RefCell::new(CaptureMetricsAggregator::new()));

    if let Some(tx) = dispatch_tx {
        capture
            .endpoint_registry_mut()
            .register_factory(EndpointFactory::new(DISPATCH_ENDPOINT, move || {
                Box::new(ChannelEndpoint::new(DISPATCH_ENDPOINT, tx.clone()).with_mode(SendMode::Block))
            }));
    }
    select_endpoint(&mut capture, &blueprint.endpoint.kind, &aggregator)?;

    let ended = Rc::new(Cell::new(0u64));
    {
        let ended = Rc::clone(&ended);
        capture.on_simulation_ending(move || ended.set(ended.get() + 1));
    }

    let mut host = Host::new(
        capture,
        &blueprint.sensors,
        &blueprint.annotations,
        &blueprint.metrics,
        config,
    )?;

    for frame in 0..config.frames {
        if let Some(length) = config.sequence_length {
            if frame > 0 && frame % length == 0 {
                host.capture.start_new_sequence()?;
                host.report.sequences += 1;
                debug!(frame, sequence = host.report.sequences - 1, "New sequence");
            }
        }
        host.step(frame)?;
    }

    host.shutdown(config.frames, config.shutdown_ticks)?;

    let mut report = host.report;
    report.simulations_ended = ended.get();
    report.metrics = aggregator.borrow().summary();
    Ok(report)
}

/// Bind the orchestrator to `kind`, wrapped so the run summary sees every record
fn select_endpoint(
    capture: &mut DatasetCapture,
    kind: &str,
    aggregator: &Rc<RefCell<CaptureMetricsAggregator>>,
) -> Result<()> {
    let registry = capture.endpoint_registry_mut();
    let Some(inner) = registry.get(kind).cloned() else {
        return Err(CliError::unknown_endpoint(kind, registry.names()));
    };

    let aggregator = Rc::clone(aggregator);
    registry.register_factory(EndpointFactory::new(kind, move || {
        Box::new(RecordingEndpoint::new(inner.create(), Rc::clone(&aggregator)))
    }));

    if !capture.set_endpoint_type_by_name(kind) {
        return Err(CliError::unknown_endpoint(
            kind,
            capture.endpoint_registry().names(),
        ));
    }
    info!(endpoint = kind, "Endpoint selected");
    Ok(())
}

impl Host {
    fn new(
        mut capture: DatasetCapture,
        sensors: &[SensorDefinition],
        annotations: &[AnnotationDefinition],
        metrics: &[MetricDefinition],
        config: &PipelineConfig,
    ) -> Result<Self> {
        for definition in annotations {
            capture.register_annotation_definition(definition.clone())?;
        }
        for definition in metrics {
            capture.register_metric(definition.clone())?;
        }

        let mut simulated = Vec::with_capacity(sensors.len());
        for definition in sensors {
            let camera = matches!(definition.modality.as_str(), "camera" | "rgb");
            let manual = definition.trigger_mode == CaptureTriggerMode::Manual;
            let handle = capture.register_sensor(definition.clone())?;
            simulated.push(SimulatedSensor {
                handle,
                camera,
                manual,
            });
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        info!(
            sensors = simulated.len(),
            annotations = annotations.len(),
            metrics = metrics.len(),
            "Host registered capture definitions"
        );

        Ok(Self {
            capture,
            sensors: simulated,
            annotations: annotations.to_vec(),
            metrics: metrics.to_vec(),
            readbacks: Vec::new(),
            rng,
            readback_latency: config.readback_latency,
            frame_delta_time: config.blueprint.simulation.frame_delta_time,
            report: HostReport {
                sequences: 1,
                ..Default::default()
            },
        })
    }

    /// One engine frame
    fn step(&mut self, frame: u64) -> Result<()> {
        for index in 0..self.sensors.len() {
            self.poll_sensor(index, frame)?;
        }

        if let Some(definition) = self.metrics.first() {
            let elapsed = frame as f64 * self.frame_delta_time;
            self.capture
                .report_metric(definition, Metric::new([elapsed]))?;
        }

        self.resolve_ready(frame);
        self.capture.update();
        self.report.frames += 1;
        Ok(())
    }

    fn poll_sensor(&mut self, index: usize, frame: u64) -> Result<()> {
        let sensor = &self.sensors[index];
        if sensor.manual && self.rng.random_bool(MANUAL_CAPTURE_PROBABILITY) {
            sensor.handle.request_capture()?;
        }
        if !sensor.handle.should_capture_this_frame() {
            return Ok(());
        }

        let payload = if sensor.camera {
            Sensor::with_image(synthetic_image(frame)).with_property("frame", frame as i64)
        } else {
            Sensor::default().with_property("frame", frame as i64)
        };
        sensor.handle.report_sensor(payload)?;

        for definition in &self.annotations {
            let future = sensor.handle.report_annotation_async(definition)?;
            let jitter = self.rng.random_range(0..=self.readback_latency);
            self.readbacks.push(Readback {
                future,
                ready_at: frame + self.readback_latency + jitter,
            });
        }

        for definition in &self.metrics {
            let objects = self.rng.random_range(0..16u32);
            sensor
                .handle
                .report_metric(definition, Metric::new([objects]))?;
        }

        self.report.captures += 1;
        Ok(())
    }

    /// Deliver every readback whose latency has elapsed
    fn resolve_ready(&mut self, frame: u64) {
        let (ready, waiting): (Vec<_>, Vec<_>) = mem::take(&mut self.readbacks)
            .into_iter()
            .partition(|readback| readback.ready_at <= frame);
        self.readbacks = waiting;

        for readback in ready {
            let boxes = self.rng.random_range(0..8u32);
            let annotation = Annotation::new(
                (0..boxes).map(|i| Value::List(vec![Value::from(i), Value::from("car")])),
            );
            match readback.future.report(annotation) {
                Ok(()) => self.report.readbacks_resolved += 1,
                Err(err) => {
                    debug!(id = %readback.future.pending_id(), error = %err, "Readback rejected");
                    self.report.report_errors += 1;
                }
            }
        }
    }

    /// Shutdown hook, then keep ticking until everything drained or the
    /// bound is hit
    fn shutdown(&mut self, mut frame: u64, max_ticks: u64) -> Result<()> {
        self.capture.notify_shutdown()?;
        let abandoned_before = self.capture.futures_abandoned();

        let mut ticks = 0;
        while !self.capture.can_be_shutdown() && ticks < max_ticks {
            self.resolve_ready(frame);
            self.capture.update();
            if self.readbacks.is_empty() {
                // only the endpoint is still busy
                thread::sleep(DRAIN_PACING);
            }
            frame += 1;
            ticks += 1;
        }

        let mut shutdown = self.capture.wait_until_complete(0);
        shutdown.ticks += ticks;
        shutdown.futures_discarded = self
            .capture
            .futures_abandoned()
            .saturating_sub(abandoned_before);
        shutdown.clean &= shutdown.futures_discarded == 0;
        if !shutdown.clean {
            warn!(
                ticks = shutdown.ticks,
                discarded = shutdown.futures_discarded,
                "Capture did not drain before the shutdown bound"
            );
        }
        self.report.shutdown = shutdown;
        Ok(())
    }
}

/// Small RGB gradient that shifts with the frame number
fn synthetic_image(frame: u64) -> ImageData {
    let shift = (frame % 256) as u8;
    let mut data = Vec::with_capacity((IMAGE_WIDTH * IMAGE_HEIGHT * 3) as usize);
    for y in 0..IMAGE_HEIGHT {
        for x in 0..IMAGE_WIDTH {
            data.push((x * 16) as u8 ^ shift);
            data.push((y * 20) as u8);
            data.push(shift);
        }
    }
    ImageData {
        width: IMAGE_WIDTH,
        height: IMAGE_HEIGHT,
        format: ImageFormat::Rgb8,
        data: Bytes::from(data),
    }
}
