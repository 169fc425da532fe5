//! Capture data model
//!
//! Values reported for sensors, annotations and metrics.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::FutureKind;

/// Loosely typed value carried by annotations, metrics and sensor properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

/// Image buffer read back from a sensor or a labeling pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    pub width: u32,

    pub height: u32,

    /// Pixel format
    pub format: ImageFormat,

    /// Raw pixel data
    pub data: Bytes,
}

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Rgb8,
    Rgba8,
    Bgra8,
    Depth,
    SemanticSeg,
}

/// Sensor capture
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sensor {
    /// Captured image, when the sensor produces one
    #[serde(default)]
    pub image: Option<ImageData>,

    /// Free-form sensor state (pose, intrinsics, ...)
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Sensor {
    pub fn with_image(image: ImageData) -> Self {
        Self {
            image: Some(image),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Annotation produced for one sensor capture
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub values: Vec<Value>,

    /// Label image (segmentation passes)
    #[serde(default)]
    pub image: Option<ImageData>,
}

impl Annotation {
    pub fn new(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            image: None,
        }
    }
}

/// Metric values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metric {
    #[serde(default)]
    pub values: Vec<Value>,
}

impl Metric {
    pub fn new(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Finalized value of any kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordPayload {
    Sensor(Sensor),
    Annotation(Annotation),
    Metric(Metric),
}

impl RecordPayload {
    pub fn kind(&self) -> FutureKind {
        match self {
            RecordPayload::Sensor(_) => FutureKind::Sensor,
            RecordPayload::Annotation(_) => FutureKind::Annotation,
            RecordPayload::Metric(_) => FutureKind::Metric,
        }
    }

    /// Image attached to the payload, if any
    pub fn image(&self) -> Option<&ImageData> {
        match self {
            RecordPayload::Sensor(sensor) => sensor.image.as_ref(),
            RecordPayload::Annotation(annotation) => annotation.image.as_ref(),
            RecordPayload::Metric(_) => None,
        }
    }

    /// Copy of the payload with image buffers removed
    pub fn without_image(&self) -> RecordPayload {
        match self {
            RecordPayload::Sensor(sensor) => RecordPayload::Sensor(Sensor {
                image: None,
                properties: sensor.properties.clone(),
            }),
            RecordPayload::Annotation(annotation) => RecordPayload::Annotation(Annotation {
                values: annotation.values.clone(),
                image: None,
            }),
            RecordPayload::Metric(metric) => RecordPayload::Metric(metric.clone()),
        }
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Sensor {}
    impl Sealed for super::Annotation {}
    impl Sealed for super::Metric {}
}

/// Value types a future can be resolved with
pub trait DataModel: sealed::Sealed + Sized {
    /// Kind of pending id this value resolves
    const KIND: FutureKind;

    fn into_payload(self) -> RecordPayload;
}

impl DataModel for Sensor {
    const KIND: FutureKind = FutureKind::Sensor;

    fn into_payload(self) -> RecordPayload {
        RecordPayload::Sensor(self)
    }
}

impl DataModel for Annotation {
    const KIND: FutureKind = FutureKind::Annotation;

    fn into_payload(self) -> RecordPayload {
        RecordPayload::Annotation(self)
    }
}

impl DataModel for Metric {
    const KIND: FutureKind = FutureKind::Metric;

    fn into_payload(self) -> RecordPayload {
        RecordPayload::Metric(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_untagged_serde() {
        let metric = Metric::new([Value::from(3), Value::from(0.5), Value::from("car")]);
        let json = serde_json::to_string(&metric).unwrap();
        assert_eq!(json, r#"{"values":[3,0.5,"car"]}"#);

        let parsed: Metric = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.values, metric.values);
    }

    #[test]
    fn test_payload_kind_matches_data_model() {
        assert_eq!(Sensor::default().into_payload().kind(), Sensor::KIND);
        assert_eq!(Annotation::default().into_payload().kind(), Annotation::KIND);
        assert_eq!(Metric::default().into_payload().kind(), Metric::KIND);
    }

    #[test]
    fn test_without_image_strips_buffers() {
        let sensor = Sensor::with_image(ImageData {
            width: 2,
            height: 2,
            format: ImageFormat::Rgb8,
            data: Bytes::from(vec![0u8; 12]),
        })
        .with_property("fov", 60.0);

        let payload = sensor.into_payload();
        assert!(payload.image().is_some());

        let stripped = payload.without_image();
        assert!(stripped.image().is_none());
        match stripped {
            RecordPayload::Sensor(s) => assert_eq!(s.properties.get("fov"), Some(&Value::Float(60.0))),
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
