//! # Error Types
//!
//! Custom error types for joycal using `thiserror`.

use thiserror::Error;

pub use crate::controller::calibration::CalibrationError;

/// Main error type for joycal
#[derive(Debug, Error)]
pub enum JoycalError {
    /// Calibration tuple violates range/fuzz/flat constraints
    #[error("Invalid calibration: {0}")]
    Calibration(#[from] CalibrationError),

    /// Calibration text encoding could not be parsed
    #[error("Invalid calibration values: {0}")]
    InvalidValues(String),

    /// Axis id not exposed by the device
    #[error("Axis {0} is not valid for device")]
    UnknownAxis(u16),

    /// Device reports no absolute axes
    #[error("Device does not have absolute axes")]
    NoAxes,

    /// Device channel call failed (ioctl, read, disconnect)
    #[error("Device channel error: {0}")]
    Channel(String),

    /// No matching device node
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Calibration database errors
    #[error("Calibration database error: {0}")]
    Storage(#[from] sled::Error),

    /// Stored record could not be decoded
    #[error("Corrupt calibration record: {0}")]
    Record(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for joycal
pub type Result<T> = std::result::Result<T, JoycalError>;
