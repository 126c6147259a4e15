//! Port-specific error types.
//!
//! Defines error types for native transport operations, separate from the
//! handler-level errors in [`crate::comms::CommsError`].

use super::traits::DeviceHandle;
use thiserror::Error;

/// Errors that can occur during native transport operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial device was not found on the system.
    #[error("Serial device not found: {0}")]
    NotFound(String),

    /// The process is not allowed to open the device.
    #[error("Permission denied opening {0}")]
    PermissionDenied(String),

    /// The driver does not support the requested baud rate.
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// The handle does not refer to an open device (never opened or already closed).
    #[error("Invalid device handle: {0}")]
    InvalidHandle(DeviceHandle),

    /// The device went away while it was open.
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// Port configuration failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a device name.
    pub fn not_found(device: impl Into<String>) -> Self {
        Self::NotFound(device.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Disconnected error from a device name.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected(device.into())
    }

    /// Map a `serialport` open error onto the transport taxonomy.
    pub(crate) fn from_open_error(device: &str, err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => Self::not_found(device),
            serialport::ErrorKind::InvalidInput => Self::config(err.to_string()),
            serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => Self::not_found(device),
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                Self::PermissionDenied(device.to_string())
            }
            _ => Self::Serial(err),
        }
    }
}
