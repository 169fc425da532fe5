//! Pipeline statistics.

use std::time::Duration;

use capture_engine::ShutdownReport;
use dispatcher::DispatchReport;
use observability::MetricsSummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Host frames simulated (shutdown drain ticks excluded)
    pub frames: u64,

    pub sequences: u64,

    /// Simulations superseded by a reset or the shutdown hook
    pub simulations_ended: u64,

    /// Frames on which some sensor reported a capture
    pub captures: u64,

    pub readbacks_resolved: u64,

    /// Reports the scheduler rejected (e.g. timed-out futures)
    pub report_errors: u64,

    pub shutdown: ShutdownReport,

    /// Records seen by the endpoint
    pub metrics: MetricsSummary,

    /// Dispatcher totals when the `dispatch` endpoint was used
    pub dispatch: Option<DispatchReport>,

    pub duration: Duration,
}

impl PipelineStats {
    /// Host frames per wall-clock second
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.frames as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Capture Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Frames: {}", self.frames);
        println!("   ├─ FPS: {:.2}", self.fps());
        println!("   ├─ Sequences: {}", self.sequences);
        println!("   ├─ Sensor captures: {}", self.captures);
        println!("   ├─ Readbacks resolved: {}", self.readbacks_resolved);
        println!("   └─ Rejected reports: {}", self.report_errors);

        println!("\n🛑 Shutdown");
        println!("   ├─ Drain ticks: {}", self.shutdown.ticks);
        println!("   ├─ Futures discarded: {}", self.shutdown.futures_discarded);
        println!(
            "   └─ Clean: {}",
            if self.shutdown.clean { "yes" } else { "no" }
        );

        println!("\n{}", self.metrics);

        if let Some(ref dispatch) = self.dispatch {
            println!("📤 Dispatcher");
            println!("   ├─ Events: {}", dispatch.events);
            println!("   ├─ Records: {}", dispatch.records);
            println!("   └─ Simulations completed: {}", dispatch.simulations_completed);
            for (name, snapshot) in &dispatch.sinks {
                println!(
                    "      • {}: written={} failed={} dropped={}",
                    name, snapshot.events_written, snapshot.failure_count, snapshot.dropped_count
                );
            }
        }

        println!();
    }
}
