//! PendingId - identity of a unit of capture work
//!
//! A pending id names a sensor capture, an annotation or a metric by the
//! sequence and step it belongs to plus the ids relevant to its kind.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AnnotationId, MetricId, SensorId};

/// Kind of work a [`PendingId`] names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FutureKind {
    Sensor,
    Metric,
    Annotation,
}

impl fmt::Display for FutureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FutureKind::Sensor => "sensor",
            FutureKind::Metric => "metric",
            FutureKind::Annotation => "annotation",
        };
        f.write_str(label)
    }
}

/// What a metric is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum MetricTarget {
    /// Simulation-wide metric
    Global { metric_id: MetricId },
    /// Metric reported on a sensor
    Sensor {
        sensor_id: SensorId,
        metric_id: MetricId,
    },
    /// Metric reported on one annotation of a sensor
    Annotation {
        sensor_id: SensorId,
        annotation_id: AnnotationId,
        metric_id: MetricId,
    },
}

/// Identity of a pending unit of work.
///
/// Equality and hashing cover the kind, sequence, step and every id the kind carries.
/// Ids are immutable once built through one of the `for_*` constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingId {
    Sensor {
        sequence: u64,
        step: u64,
        sensor_id: SensorId,
    },
    Annotation {
        sequence: u64,
        step: u64,
        sensor_id: SensorId,
        annotation_id: AnnotationId,
    },
    Metric {
        sequence: u64,
        step: u64,
        target: MetricTarget,
    },
}

impl PendingId {
    /// Id of a sensor capture
    pub fn for_sensor(sequence: u64, step: u64, sensor_id: impl Into<SensorId>) -> Self {
        Self::Sensor {
            sequence,
            step,
            sensor_id: sensor_id.into(),
        }
    }

    /// Id of a global metric
    pub fn for_metric(sequence: u64, step: u64, metric_id: impl Into<MetricId>) -> Self {
        Self::Metric {
            sequence,
            step,
            target: MetricTarget::Global {
                metric_id: metric_id.into(),
            },
        }
    }

    /// Id of a metric attached to a sensor
    pub fn for_sensor_metric(
        sequence: u64,
        step: u64,
        sensor_id: impl Into<SensorId>,
        metric_id: impl Into<MetricId>,
    ) -> Self {
        Self::Metric {
            sequence,
            step,
            target: MetricTarget::Sensor {
                sensor_id: sensor_id.into(),
                metric_id: metric_id.into(),
            },
        }
    }

    /// Id of a metric attached to an annotation on a sensor
    pub fn for_annotation_metric(
        sequence: u64,
        step: u64,
        sensor_id: impl Into<SensorId>,
        annotation_id: impl Into<AnnotationId>,
        metric_id: impl Into<MetricId>,
    ) -> Self {
        Self::Metric {
            sequence,
            step,
            target: MetricTarget::Annotation {
                sensor_id: sensor_id.into(),
                annotation_id: annotation_id.into(),
                metric_id: metric_id.into(),
            },
        }
    }

    /// Id of an annotation on a sensor
    pub fn for_annotation(
        sequence: u64,
        step: u64,
        sensor_id: impl Into<SensorId>,
        annotation_id: impl Into<AnnotationId>,
    ) -> Self {
        Self::Annotation {
            sequence,
            step,
            sensor_id: sensor_id.into(),
            annotation_id: annotation_id.into(),
        }
    }

    pub fn kind(&self) -> FutureKind {
        match self {
            PendingId::Sensor { .. } => FutureKind::Sensor,
            PendingId::Annotation { .. } => FutureKind::Annotation,
            PendingId::Metric { .. } => FutureKind::Metric,
        }
    }

    pub fn sequence(&self) -> u64 {
        match self {
            PendingId::Sensor { sequence, .. }
            | PendingId::Annotation { sequence, .. }
            | PendingId::Metric { sequence, .. } => *sequence,
        }
    }

    pub fn step(&self) -> u64 {
        match self {
            PendingId::Sensor { step, .. }
            | PendingId::Annotation { step, .. }
            | PendingId::Metric { step, .. } => *step,
        }
    }

    /// Sensor the work belongs to, if any
    pub fn sensor_id(&self) -> Option<&SensorId> {
        match self {
            PendingId::Sensor { sensor_id, .. } | PendingId::Annotation { sensor_id, .. } => {
                Some(sensor_id)
            }
            PendingId::Metric { target, .. } => match target {
                MetricTarget::Global { .. } => None,
                MetricTarget::Sensor { sensor_id, .. }
                | MetricTarget::Annotation { sensor_id, .. } => Some(sensor_id),
            },
        }
    }

    /// Annotation the work belongs to, if any
    pub fn annotation_id(&self) -> Option<&AnnotationId> {
        match self {
            PendingId::Annotation { annotation_id, .. } => Some(annotation_id),
            PendingId::Metric {
                target: MetricTarget::Annotation { annotation_id, .. },
                ..
            } => Some(annotation_id),
            _ => None,
        }
    }

    pub fn metric_id(&self) -> Option<&MetricId> {
        match self {
            PendingId::Metric { target, .. } => match target {
                MetricTarget::Global { metric_id }
                | MetricTarget::Sensor { metric_id, .. }
                | MetricTarget::Annotation { metric_id, .. } => Some(metric_id),
            },
            _ => None,
        }
    }

    /// True when the id names a non-empty sensor, whatever its kind.
    ///
    /// Annotation ids and sensor-scoped metric ids are also used to look sensors up.
    pub fn is_valid_sensor_id(&self) -> bool {
        self.sensor_id().is_some_and(|id| !id.is_empty())
    }

    pub fn is_valid_metric_id(&self) -> bool {
        self.kind() == FutureKind::Metric && self.metric_id().is_some_and(|id| !id.is_empty())
    }

    pub fn is_valid_annotation_id(&self) -> bool {
        match self {
            PendingId::Annotation {
                sensor_id,
                annotation_id,
                ..
            } => !sensor_id.is_empty() && !annotation_id.is_empty(),
            _ => false,
        }
    }

    /// Validity predicate matching the id's own kind
    pub fn is_valid(&self) -> bool {
        match self.kind() {
            FutureKind::Sensor => self.is_valid_sensor_id(),
            FutureKind::Metric => self.is_valid_metric_id(),
            FutureKind::Annotation => self.is_valid_annotation_id(),
        }
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}:{}", self.kind(), self.sequence(), self.step())?;
        if let Some(sensor) = self.sensor_id() {
            write!(f, " sensor={sensor}")?;
        }
        if let Some(annotation) = self.annotation_id() {
            write!(f, " annotation={annotation}")?;
        }
        if let Some(metric) = self.metric_id() {
            write!(f, " metric={metric}")?;
        }
        write!(f, "]")
    }
}
