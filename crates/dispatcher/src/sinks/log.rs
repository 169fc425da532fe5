//! LogSink - logs event summaries via tracing

use contracts::{CaptureEvent, ContractError, RecordSink};
use tracing::{debug, info, instrument};

/// Sink that logs event summaries for debugging
pub struct LogSink {
    name: String,
    records: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: 0,
        }
    }

    fn log_event(&mut self, event: &CaptureEvent) {
        match event {
            CaptureEvent::Record(record) => {
                self.records += 1;
                debug!(
                    sink = %self.name,
                    simulation_id = %record.simulation_id,
                    id = %record.id,
                    frame = record.frame,
                    latency_frames = record.latency_frames,
                    has_image = record.payload.image().is_some(),
                    "Record received"
                );
            }
            CaptureEvent::SimulationCompleted(summary) => {
                info!(
                    sink = %self.name,
                    simulation_id = %summary.simulation_id,
                    records = summary.records_written,
                    abandoned = summary.futures_abandoned,
                    frames = summary.total_frames,
                    "Simulation completed"
                );
            }
            other => {
                info!(
                    sink = %self.name,
                    simulation_id = %other.simulation_id(),
                    event = other.label(),
                    "Capture event"
                );
            }
        }
    }
}

impl RecordSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, event = event.label())
    )]
    async fn write(&mut self, event: &CaptureEvent) -> Result<(), ContractError> {
        self.log_event(event);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, records = self.records, "LogSink closed");
        Ok(())
    }
}
