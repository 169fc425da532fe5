//! FileSink - writes capture output to disk
//!
//! Layout under `base_path`:
//!
//! ```text
//! sim-0001/
//!   simulation.json
//!   definitions/sensor.cam.json
//!   sequence.0/step000003.cam.sensor.json
//!   sequence.0/step000003.cam.sensor.png
//!   completion.json
//! ```

use contracts::{
    CaptureEvent, CaptureRecord, ContractError, ImageData, ImageFormat, MetricTarget, PendingId,
    RecordPayload, RecordSink, SimulationId,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
    /// Pretty-print JSON files
    pub pretty: bool,
}

impl FileSinkConfig {
    /// Create config from params map (`base_path`, `pretty`)
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));
        let pretty = params
            .get("pretty")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));

        Self { base_path, pretty }
    }
}

/// Record as written to disk; images live in a sibling PNG file
#[derive(Serialize)]
struct RecordFile<'a> {
    simulation_id: SimulationId,
    id: &'a PendingId,
    frame: u64,
    timestamp: f64,
    latency_frames: u64,
    payload: RecordPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_file: Option<String>,
}

/// Sink that writes capture events to disk files
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    created_dirs: HashSet<PathBuf>,
    files_written: u64,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            created_dirs: HashSet::new(),
            files_written: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    pub fn files_written(&self) -> u64 {
        self.files_written
    }

    fn simulation_dir(&self, simulation_id: SimulationId) -> PathBuf {
        self.config.base_path.join(simulation_id.to_string())
    }

    fn ensure_dir(&mut self, dir: &Path) -> std::io::Result<()> {
        if !self.created_dirs.contains(dir) {
            fs::create_dir_all(dir)?;
            self.created_dirs.insert(dir.to_path_buf());
        }
        Ok(())
    }

    fn write_json<T: Serialize>(&mut self, path: &Path, value: &T) -> std::io::Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        let result = if self.config.pretty {
            serde_json::to_writer_pretty(writer, value)
        } else {
            serde_json::to_writer(writer, value)
        };
        result.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.files_written += 1;
        Ok(())
    }

    fn write_event_to_disk(&mut self, event: &CaptureEvent) -> std::io::Result<()> {
        let sim_dir = self.simulation_dir(event.simulation_id());
        self.ensure_dir(&sim_dir)?;

        match event {
            CaptureEvent::SimulationStarted(metadata) => {
                self.write_json(&sim_dir.join("simulation.json"), metadata)
            }
            CaptureEvent::SensorRegistered { definition, .. } => {
                let path = self.definition_path(&sim_dir, "sensor", &definition.id)?;
                self.write_json(&path, definition)
            }
            CaptureEvent::AnnotationRegistered { definition, .. } => {
                let path = self.definition_path(&sim_dir, "annotation", &definition.id)?;
                self.write_json(&path, definition)
            }
            CaptureEvent::MetricRegistered { definition, .. } => {
                let path = self.definition_path(&sim_dir, "metric", &definition.id)?;
                self.write_json(&path, definition)
            }
            CaptureEvent::Record(record) => self.write_record(&sim_dir, record),
            CaptureEvent::SimulationCompleted(summary) => {
                self.write_json(&sim_dir.join("completion.json"), summary)
            }
        }
    }

    fn definition_path(&mut self, sim_dir: &Path, kind: &str, id: &str) -> std::io::Result<PathBuf> {
        let dir = sim_dir.join("definitions");
        self.ensure_dir(&dir)?;
        Ok(dir.join(format!("{kind}.{}.json", sanitize(id))))
    }

    fn write_record(&mut self, sim_dir: &Path, record: &CaptureRecord) -> std::io::Result<()> {
        let dir = sim_dir.join(format!("sequence.{}", record.id.sequence()));
        self.ensure_dir(&dir)?;
        let stem = record_stem(&record.id);

        let image_file = match record.payload.image() {
            Some(image) => {
                let file_name = format!("{stem}.png");
                save_image(&dir.join(&file_name), image)?;
                self.files_written += 1;
                Some(file_name)
            }
            None => None,
        };

        let file = RecordFile {
            simulation_id: record.simulation_id,
            id: &record.id,
            frame: record.frame,
            timestamp: record.timestamp,
            latency_frames: record.latency_frames,
            payload: record.payload.without_image(),
            image_file,
        };
        self.write_json(&dir.join(format!("{stem}.json")), &file)
    }

    fn persist_event(&mut self, event: &CaptureEvent) -> Result<(), ContractError> {
        self.write_event_to_disk(event).map_err(|e| {
            error!(sink = %self.name, event = event.label(), error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }
}

/// Keep ids usable as path components
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// File stem for a record, unique within its sequence directory
fn record_stem(id: &PendingId) -> String {
    let step = format!("step{:06}", id.step());
    match id {
        PendingId::Sensor { sensor_id, .. } => {
            format!("{step}.{}.sensor", sanitize(sensor_id))
        }
        PendingId::Annotation {
            sensor_id,
            annotation_id,
            ..
        } => format!(
            "{step}.{}.{}.annotation",
            sanitize(sensor_id),
            sanitize(annotation_id)
        ),
        PendingId::Metric { target, .. } => match target {
            MetricTarget::Global { metric_id } => {
                format!("{step}.metric.{}", sanitize(metric_id))
            }
            MetricTarget::Sensor {
                sensor_id,
                metric_id,
            } => format!(
                "{step}.{}.metric.{}",
                sanitize(sensor_id),
                sanitize(metric_id)
            ),
            MetricTarget::Annotation {
                sensor_id,
                annotation_id,
                metric_id,
            } => format!(
                "{step}.{}.{}.metric.{}",
                sanitize(sensor_id),
                sanitize(annotation_id),
                sanitize(metric_id)
            ),
        },
    }
}

fn bytes_per_pixel(format: ImageFormat) -> u64 {
    match format {
        ImageFormat::Rgb8 => 3,
        ImageFormat::Rgba8 | ImageFormat::Bgra8 | ImageFormat::Depth | ImageFormat::SemanticSeg => 4,
    }
}

/// `image::save_buffer` panics on a length mismatch, so check first
fn check_image_len(image: &ImageData) -> std::io::Result<()> {
    let expected = u64::from(image.width)
        .checked_mul(u64::from(image.height))
        .and_then(|pixels| pixels.checked_mul(bytes_per_pixel(image.format)));
    match expected {
        Some(expected) if expected == image.data.len() as u64 => Ok(()),
        Some(expected) => Err(std::io::Error::other(format!(
            "image buffer is {} bytes, expected {expected} for {}x{} {:?}",
            image.data.len(),
            image.width,
            image.height,
            image.format
        ))),
        None => Err(std::io::Error::other(format!(
            "image dimensions {}x{} overflow",
            image.width, image.height
        ))),
    }
}

fn save_image(path: &Path, image: &ImageData) -> std::io::Result<()> {
    check_image_len(image)?;
    match image.format {
        ImageFormat::Rgb8 => image::save_buffer(
            path,
            &image.data,
            image.width,
            image.height,
            image::ColorType::Rgb8,
        )
        .map_err(std::io::Error::other),

        ImageFormat::Rgba8 | ImageFormat::Depth | ImageFormat::SemanticSeg => image::save_buffer(
            path,
            &image.data,
            image.width,
            image.height,
            image::ColorType::Rgba8,
        )
        .map_err(std::io::Error::other),

        ImageFormat::Bgra8 => {
            let mut rgba_data = image.data.to_vec();
            for chunk in rgba_data.chunks_exact_mut(4) {
                chunk.swap(0, 2);
            }
            image::save_buffer(
                path,
                &rgba_data,
                image.width,
                image.height,
                image::ColorType::Rgba8,
            )
            .map_err(std::io::Error::other)
        }
    }
}

impl RecordSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, event),
        fields(sink = %self.name, event = event.label())
    )]
    async fn write(&mut self, event: &CaptureEvent) -> Result<(), ContractError> {
        self.persist_event(event)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, files = self.files_written, "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{Sensor, SensorDefinition, SimulationMetadata, Value};
    use tempfile::tempdir;

    fn sink_in(dir: &Path) -> FileSink {
        let config = FileSinkConfig {
            base_path: dir.to_path_buf(),
            pretty: false,
        };
        FileSink::new("test_file", config).unwrap()
    }

    #[test]
    fn test_record_stems() {
        assert_eq!(
            record_stem(&PendingId::for_sensor(0, 3, "cam/front")),
            "step000003.cam_front.sensor"
        );
        assert_eq!(
            record_stem(&PendingId::for_annotation_metric(1, 12, "cam", "bbox", "count")),
            "step000012.cam.bbox.metric.count"
        );
        assert_eq!(
            record_stem(&PendingId::for_metric(0, 0, "fps")),
            "step000000.metric.fps"
        );
    }

    #[test]
    fn test_from_params() {
        let params = HashMap::from([
            ("base_path".to_string(), "/tmp/capture".to_string()),
            ("pretty".to_string(), "TRUE".to_string()),
        ]);
        let config = FileSinkConfig::from_params(&params);
        assert_eq!(config.base_path, PathBuf::from("/tmp/capture"));
        assert!(config.pretty);
        assert!(!FileSinkConfig::from_params(&HashMap::new()).pretty);
    }

    #[tokio::test]
    async fn test_file_sink_writes_layout() {
        let dir = tempdir().unwrap();
        let mut sink = sink_in(dir.path());
        let simulation_id = SimulationId(1);

        sink.write(&CaptureEvent::SimulationStarted(SimulationMetadata::new(
            simulation_id,
        )))
        .await
        .unwrap();
        sink.write(&CaptureEvent::SensorRegistered {
            simulation_id,
            definition: SensorDefinition::new("cam", "camera"),
        })
        .await
        .unwrap();

        let image = ImageData {
            width: 2,
            height: 1,
            format: ImageFormat::Rgb8,
            data: Bytes::from(vec![255, 0, 0, 0, 255, 0]),
        };
        let record = CaptureRecord {
            simulation_id,
            id: PendingId::for_sensor(0, 3, "cam"),
            frame: 3,
            timestamp: 0.05,
            latency_frames: 1,
            payload: RecordPayload::Sensor(
                Sensor::with_image(image).with_property("exposure", Value::from(0.5)),
            ),
        };
        sink.write(&CaptureEvent::Record(record)).await.unwrap();
        sink.flush().await.unwrap();

        let sim_dir = dir.path().join("sim-0001");
        assert!(sim_dir.join("simulation.json").exists());
        assert!(sim_dir.join("definitions/sensor.cam.json").exists());

        let seq_dir = sim_dir.join("sequence.0");
        assert!(seq_dir.join("step000003.cam.sensor.png").exists());
        let json: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(seq_dir.join("step000003.cam.sensor.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json["image_file"], "step000003.cam.sensor.png");
        assert_eq!(json["latency_frames"], 1);
        assert!(json["payload"]["image"].is_null());
        assert_eq!(json["payload"]["properties"]["exposure"], 0.5);
        assert_eq!(sink.files_written(), 4);
    }

    #[test]
    fn test_image_len_check() {
        let image = |width, height, format, len: usize| ImageData {
            width,
            height,
            format,
            data: Bytes::from(vec![0u8; len]),
        };
        assert!(check_image_len(&image(2, 2, ImageFormat::Rgb8, 12)).is_ok());
        assert!(check_image_len(&image(2, 2, ImageFormat::Bgra8, 16)).is_ok());
        assert!(check_image_len(&image(2, 2, ImageFormat::Depth, 12)).is_err());
        assert!(check_image_len(&image(u32::MAX, u32::MAX, ImageFormat::Rgba8, 4)).is_err());
    }

    #[tokio::test]
    async fn test_bad_image_is_a_sink_error() {
        let dir = tempdir().unwrap();
        let mut sink = sink_in(dir.path());
        let record = CaptureRecord {
            simulation_id: SimulationId(1),
            id: PendingId::for_sensor(0, 0, "cam"),
            frame: 0,
            timestamp: 0.0,
            latency_frames: 0,
            payload: RecordPayload::Sensor(Sensor::with_image(ImageData {
                width: 4,
                height: 4,
                format: ImageFormat::Rgba8,
                data: Bytes::from_static(&[0, 1, 2]),
            })),
        };

        let err = sink.write(&CaptureEvent::Record(record)).await.unwrap_err();
        assert!(matches!(err, ContractError::SinkWrite { .. }));
    }
}
