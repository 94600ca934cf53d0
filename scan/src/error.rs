//! Error taxonomy for a scan.
//!
//! Config and range errors surface before any hardware action and are never
//! retried. Timeouts abort the remaining scan once the retry budget is spent.
//! Data gaps are recorded and the scan continues. Cancellation is cooperative.

use hardware::DeviceError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::range::RangeError;
use crate::reconstruct::DataGapError;
use crate::session::SessionState;

/// Any error that can end or interrupt a scan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Malformed scan specification
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scan edges outside the axis travel range
    #[error("range error: {0}")]
    Range(#[from] RangeError),

    /// No triggered burst arrived within the bounded wait
    #[error("device timed out waiting for burst at sample {index}")]
    DeviceTimeout { index: usize },

    /// Burst arrived without the expected signal data
    #[error("data gap: {0}")]
    DataGap(#[from] DataGapError),

    /// Scan was cancelled by the caller
    #[error("scan cancelled")]
    Cancelled,

    /// Device rejected a command or failed to communicate
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Session state machine was driven out of order
    #[error("invalid session transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
}

/// Result type for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;
