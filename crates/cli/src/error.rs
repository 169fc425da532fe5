//! Error types for CLI operations.

use capture_engine::CaptureError;
use dispatcher::DispatcherError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Endpoint kind not present in the registry
    #[error("Unknown endpoint kind '{kind}' (known: {known})")]
    UnknownEndpoint { kind: String, known: String },

    /// Scheduler rejected an operation
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Dispatcher could not be built
    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] DispatcherError),

    /// Host loop thread failed
    #[error("Host loop failed: {message}")]
    HostLoop { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn unknown_endpoint<'a>(
        kind: impl Into<String>,
        known: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self::UnknownEndpoint {
            kind: kind.into(),
            known: known.into_iter().collect::<Vec<_>>().join(", "),
        }
    }

    pub fn host_loop(message: impl Into<String>) -> Self {
        Self::HostLoop {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
