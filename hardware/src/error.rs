//! Error types shared by all device collaborators.

use thiserror::Error;

/// Error raised by a motion axis or acquisition module.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// A blocking operation did not complete within its deadline.
    #[error("device timed out after {waited_ms} ms: {operation}")]
    Timeout { operation: String, waited_ms: u64 },

    /// The device has not been connected yet (or was closed).
    #[error("device not connected: {0}")]
    NotConnected(String),

    /// Transport or protocol level failure.
    #[error("communication error: {0}")]
    Communication(String),

    /// The device rejected an argument (e.g. a target outside its travel range).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl DeviceError {
    /// Whether this error is a timeout on a blocking call.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeviceError::Timeout { .. })
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
