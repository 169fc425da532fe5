//! RecordSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for asynchronous sinks fed by the dispatcher.

use crate::{CaptureEvent, ContractError};

/// Asynchronous event output
///
/// All dispatcher sinks must implement this trait.
#[trait_variant::make(RecordSink: Send)]
pub trait LocalRecordSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one capture event
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, event: &CaptureEvent) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
