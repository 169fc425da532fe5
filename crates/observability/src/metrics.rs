//! Capture metrics
//!
//! Counters and histograms emitted through the `metrics` facade, plus an
//! in-memory aggregator for end-of-run summaries.

use std::collections::HashMap;

use contracts::{CaptureRecord, CompletionMetadata, FutureKind};
use metrics::{counter, gauge, histogram};

/// Record a finalized record
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_record_finalized;
///
/// record_record_finalized(record.id.kind(), record.latency_frames);
/// ```
pub fn record_record_finalized(kind: FutureKind, latency_frames: u64) {
    counter!("capture_records_total", "kind" => kind.to_string()).increment(1);
    histogram!("capture_resolution_latency_frames", "kind" => kind.to_string())
        .record(latency_frames as f64);
}

/// Record futures discarded without a result
pub fn record_future_abandoned(count: u64) {
    counter!("capture_futures_abandoned_total").increment(count);
}

/// Record the number of outstanding futures of the reporting simulation
pub fn record_pending_futures(count: usize) {
    gauge!("capture_pending_futures").set(count as f64);
}

/// Record an endpoint call that returned an error
pub fn record_endpoint_failure(endpoint: &str) {
    counter!("capture_endpoint_failures_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record a completed simulation
pub fn record_simulation_completed(summary: &CompletionMetadata) {
    counter!("capture_simulations_completed_total").increment(1);
    gauge!("capture_last_simulation_frames").set(summary.total_frames as f64);
    histogram!("capture_simulation_records").record(summary.records_written as f64);
}

/// Record an event handed to a sink by the dispatcher
pub fn record_event_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "capture_events_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record sink queue depth
pub fn record_queue_depth(sink_name: &str, depth: usize) {
    gauge!("capture_sink_queue_depth", "sink" => sink_name.to_string()).set(depth as f64);
}

/// Aggregates capture statistics in memory for a run summary
#[derive(Debug, Clone, Default)]
pub struct CaptureMetricsAggregator {
    pub total_records: u64,

    /// Records per kind
    pub kind_counts: HashMap<FutureKind, u64>,

    /// Records per sensor (sensor data, annotations and sensor metrics)
    pub sensor_counts: HashMap<String, u64>,

    /// Frames between scheduling and resolution
    pub latency_stats: RunningStats,

    pub simulations_completed: u64,

    pub futures_abandoned: u64,

    pub endpoint_failures: u64,
}

impl CaptureMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: &CaptureRecord) {
        self.total_records += 1;
        *self.kind_counts.entry(record.id.kind()).or_insert(0) += 1;
        if let Some(sensor_id) = record.id.sensor_id() {
            *self
                .sensor_counts
                .entry(sensor_id.to_string())
                .or_insert(0) += 1;
        }
        self.latency_stats.push(record.latency_frames as f64);
    }

    pub fn completed(&mut self, summary: &CompletionMetadata) {
        self.simulations_completed += 1;
        self.futures_abandoned += summary.futures_abandoned;
        self.endpoint_failures += summary.endpoint_failures;
    }

    pub fn summary(&self) -> MetricsSummary {
        let count = |kind: FutureKind| self.kind_counts.get(&kind).copied().unwrap_or(0);
        let issued = self.total_records + self.futures_abandoned;
        MetricsSummary {
            total_records: self.total_records,
            sensor_records: count(FutureKind::Sensor),
            annotation_records: count(FutureKind::Annotation),
            metric_records: count(FutureKind::Metric),
            simulations_completed: self.simulations_completed,
            futures_abandoned: self.futures_abandoned,
            abandon_rate: if issued > 0 {
                self.futures_abandoned as f64 / issued as f64 * 100.0
            } else {
                0.0
            },
            endpoint_failures: self.endpoint_failures,
            latency_frames: StatsSummary::from(&self.latency_stats),
            sensor_counts: self.sensor_counts.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Capture run summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_records: u64,
    pub sensor_records: u64,
    pub annotation_records: u64,
    pub metric_records: u64,
    pub simulations_completed: u64,
    pub futures_abandoned: u64,
    pub abandon_rate: f64,
    pub endpoint_failures: u64,
    pub latency_frames: StatsSummary,
    pub sensor_counts: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Capture Metrics Summary ===")?;
        writeln!(f, "Total records: {}", self.total_records)?;
        writeln!(
            f,
            "  sensor: {}, annotation: {}, metric: {}",
            self.sensor_records, self.annotation_records, self.metric_records
        )?;
        writeln!(f, "Simulations completed: {}", self.simulations_completed)?;
        writeln!(
            f,
            "Futures abandoned: {} ({:.2}%)",
            self.futures_abandoned, self.abandon_rate
        )?;
        writeln!(f, "Endpoint failures: {}", self.endpoint_failures)?;
        writeln!(f, "Resolution latency (frames): {}", self.latency_frames)?;

        if !self.sensor_counts.is_empty() {
            let mut sensors: Vec<_> = self.sensor_counts.iter().collect();
            sensors.sort();
            writeln!(f, "Records per sensor:")?;
            for (sensor, count) in sensors {
                writeln!(f, "  {}: {}", sensor, count)?;
            }
        }

        Ok(())
    }
}

/// Summary of a [`RunningStats`]
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean/variance (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
