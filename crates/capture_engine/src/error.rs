//! Capture engine errors

use contracts::ContractError;
use thiserror::Error;

/// Errors returned by the capture API
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Call is not allowed in the current state (wrong frame, ended simulation,
    /// disposed handle, duplicate report, unregistered definition)
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Call carried a malformed argument
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A simulation was needed but neither an endpoint instance nor an
    /// endpoint type has been configured
    #[error("no consumer endpoint configured; call set_endpoint or set_endpoint_type first")]
    NoEndpointConfigured,

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl CaptureError {
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn simulation_unavailable() -> Self {
        Self::invalid_operation("the simulation this object belongs to no longer exists")
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Self::InvalidOperation { .. })
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
