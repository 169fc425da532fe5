//! Pipeline orchestration module.

mod host;
mod orchestrator;
mod recording;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::PipelineStats;
