//! # Dispatcher
//!
//! Moves capture events off the host thread and fans them out to sinks.
//!
//! - `ChannelEndpoint` forwards events from a simulation into a channel
//! - `Dispatcher` consumes the channel and feeds every sink
//! - Each sink runs behind its own queue so a slow sink never blocks the others

pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{CaptureEvent, RecordSink};
pub use dispatcher::{
    create_dispatcher, DispatchReport, Dispatcher, DispatcherBuilder, DispatcherConfig,
};
pub use endpoint::{ChannelEndpoint, SendMode};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LogSink};
