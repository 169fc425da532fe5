//! Layered error definitions
//!
//! Categorized by source: config / endpoint / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Endpoint Errors =====
    /// Endpoint rejected an event
    #[error("endpoint '{endpoint}' write error: {message}")]
    EndpointWrite { endpoint: String, message: String },

    /// Endpoint can no longer accept events
    #[error("endpoint '{endpoint}' is closed")]
    EndpointClosed { endpoint: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create endpoint write error
    pub fn endpoint_write(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EndpointWrite {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create endpoint closed error
    pub fn endpoint_closed(endpoint: impl Into<String>) -> Self {
        Self::EndpointClosed {
            endpoint: endpoint.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
