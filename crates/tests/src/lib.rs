//! # Integration Tests
//!
//! End-to-end tests across the workspace crates.
//!
//! Covers:
//! - Contract snapshot tests
//! - config -> DatasetCapture -> ChannelEndpoint -> Dispatcher -> FileSink

#[cfg(test)]
mod contract_tests {
    use contracts::{CaptureEvent, PendingId, SimulationId, SimulationMetadata};

    #[test]
    fn test_event_tags_are_stable() {
        let event = CaptureEvent::SimulationStarted(SimulationMetadata::new(SimulationId(3)));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "simulation_started");
        assert_eq!(json["simulation_id"], 3);
        assert_eq!(json["schema_version"], contracts::SCHEMA_VERSION);
    }

    #[test]
    fn test_pending_id_snapshot() {
        let id = PendingId::for_annotation_metric(1, 7, "cam", "bbox", "count");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["kind"], "metric");
        assert_eq!(json["sequence"], 1);
        assert_eq!(json["step"], 7);
        assert_eq!(json["target"]["scope"], "annotation");
        assert_eq!(json["target"]["sensor_id"], "cam");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::fs;
    use std::path::Path;

    use bytes::Bytes;
    use capture_engine::{DatasetCapture, SensorHandle};
    use config_loader::{CaptureBlueprint, ConfigFormat, ConfigLoader};
    use contracts::{
        Annotation, CaptureEvent, ImageData, ImageFormat, Metric,
        MetricDefinition, Sensor,
    };
    use dispatcher::{create_dispatcher, ChannelEndpoint, DispatchReport};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    fn blueprint(output: &Path, timeout: Option<u64>) -> CaptureBlueprint {
        let timeout = timeout
            .map(|frames| format!("future_timeout_frames = {frames}"))
            .unwrap_or_default();
        let content = format!(
            r#"
[simulation]
frame_delta_time = 0.1
{timeout}

[[sensors]]
id = "cam"
modality = "camera"
capture_interval = 2

[[annotations]]
id = "bbox2d"

[[metrics]]
id = "object_count"

[[sinks]]
name = "disk"
sink_type = "file"
queue_capacity = 256
[sinks.params]
base_path = "{}"

[[sinks]]
name = "log"
sink_type = "log"
"#,
            output.display()
        );
        ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap()
    }

    /// Build the dispatcher and an orchestrator whose simulations feed it
    async fn start(
        blueprint: &CaptureBlueprint,
    ) -> (DatasetCapture, JoinHandle<DispatchReport>) {
        let (tx, rx) = mpsc::channel::<CaptureEvent>(1024);
        let dispatcher = create_dispatcher(blueprint.sinks.clone(), rx).await.unwrap();
        let handle = dispatcher.spawn();

        let mut capture = DatasetCapture::new(blueprint.simulation.clone());
        capture.set_endpoint(ChannelEndpoint::new("dispatch", tx));
        (capture, handle)
    }

    fn register(capture: &mut DatasetCapture, blueprint: &CaptureBlueprint) -> SensorHandle {
        for definition in &blueprint.annotations {
            capture
                .register_annotation_definition(definition.clone())
                .unwrap();
        }
        for definition in &blueprint.metrics {
            capture.register_metric(definition.clone()).unwrap();
        }
        capture.register_sensor(blueprint.sensors[0].clone()).unwrap()
    }

    fn image() -> ImageData {
        ImageData {
            width: 2,
            height: 2,
            format: ImageFormat::Bgra8,
            data: Bytes::from(vec![0u8; 16]),
        }
    }

    /// Tick until shutdown is allowed, letting the dispatcher drain in between
    async fn drain(capture: &mut DatasetCapture) {
        capture.notify_shutdown().unwrap();
        for _ in 0..1000 {
            if capture.can_be_shutdown() {
                return;
            }
            capture.update();
            tokio::task::yield_now().await;
        }
        panic!("capture did not drain");
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    /// Config -> DatasetCapture -> ChannelEndpoint -> Dispatcher -> FileSink
    #[tokio::test]
    async fn test_e2e_capture_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = blueprint(dir.path(), None);
        let (mut capture, dispatcher) = start(&blueprint).await;
        let cam = register(&mut capture, &blueprint);
        let bbox = &blueprint.annotations[0];
        let count = &blueprint.metrics[0];

        for _ in 0..6 {
            if cam.should_capture_this_frame() {
                cam.report_sensor(Sensor::with_image(image())).unwrap();
                let annotation = cam.report_annotation(bbox, Annotation::new([1, 2])).unwrap();
                annotation
                    .report_metric(count, Metric::new([2]))
                    .unwrap();
                // the same annotation cannot be reported twice in one frame
                let duplicate = cam.report_annotation_async(bbox).unwrap_err();
                assert!(duplicate.is_invalid_operation());
            }
            capture.update();
        }

        drain(&mut capture).await;
        drop(capture);
        let report = dispatcher.await.unwrap();

        // cam due on 0, 2, 4: sensor + annotation + annotation metric each
        assert_eq!(report.records, 9);
        assert_eq!(report.simulations_completed, 1);
        assert!(report.sinks.iter().all(|(_, m)| m.failure_count == 0));

        let sim_dir = dir.path().join("sim-0001");
        assert!(sim_dir.join("simulation.json").exists());
        assert!(sim_dir.join("definitions").join("sensor.cam.json").exists());
        assert!(sim_dir.join("definitions").join("metric.object_count.json").exists());

        let seq = sim_dir.join("sequence.0");
        assert!(seq.join("step000004.cam.sensor.png").exists());
        let metric = read_json(&seq.join("step000002.cam.bbox2d.metric.object_count.json"));
        assert_eq!(metric["payload"]["values"][0], 2);
        assert_eq!(metric["timestamp"], 0.2);

        let completion = read_json(&sim_dir.join("completion.json"));
        assert_eq!(completion["records_written"], 9);
        assert_eq!(completion["futures_abandoned"], 0);
    }

    /// Futures issued before a reset still land in the superseded simulation
    #[tokio::test]
    async fn test_e2e_reset_drains_previous_simulation() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = blueprint(dir.path(), None);
        let (mut capture, dispatcher) = start(&blueprint).await;
        let cam = register(&mut capture, &blueprint);

        let readback = cam.report_sensor_async().unwrap();
        capture.update();
        capture.reset_simulation().unwrap();
        assert_eq!(capture.shutting_down_count(), 1);
        assert!(!cam.is_valid());

        // new simulation needs its own registrations
        let cam2 = register(&mut capture, &blueprint);
        cam2.report_sensor(Sensor::default()).unwrap();

        readback.report(Sensor::with_image(image())).unwrap();
        assert!(!readback.is_pending());
        capture.update();

        drain(&mut capture).await;
        drop(capture);
        let report = dispatcher.await.unwrap();
        assert_eq!(report.simulations_completed, 2);

        let first = dir.path().join("sim-0001");
        let record = read_json(&first.join("sequence.0").join("step000000.cam.sensor.json"));
        assert_eq!(record["latency_frames"], 1);
        assert_eq!(record["image_file"], "step000000.cam.sensor.png");
        assert!(dir
            .path()
            .join("sim-0002")
            .join("sequence.0")
            .join("step000000.cam.sensor.json")
            .exists());
    }

    /// A future nobody resolves is aged out and counted
    #[tokio::test]
    async fn test_e2e_timed_out_future_is_abandoned() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = blueprint(dir.path(), Some(3));
        let (mut capture, dispatcher) = start(&blueprint).await;
        let count = MetricDefinition::new("object_count");
        capture.register_metric(count.clone()).unwrap();

        let lost = capture.report_metric_async(&count).unwrap();
        for _ in 0..4 {
            capture.update();
        }
        assert!(!lost.is_pending());
        assert!(lost.report(Metric::new([1])).is_err());

        drain(&mut capture).await;
        drop(capture);
        dispatcher.await.unwrap();

        let completion = read_json(&dir.path().join("sim-0001").join("completion.json"));
        assert_eq!(completion["futures_abandoned"], 1);
        assert_eq!(completion["records_written"], 0);
    }
}
