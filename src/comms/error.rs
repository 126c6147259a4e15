//! Handler-level error types.

use crate::port::PortError;
use thiserror::Error;

/// Errors returned by [`CommsHandler`](super::CommsHandler) operations.
///
/// `AlreadyConnected` and `NotConnected` are ordinary outcomes of calling an
/// operation in the wrong state; no transport call was made. The `Transport*`
/// variants wrap the driver's error together with the device it concerned.
#[derive(Debug, Error)]
pub enum CommsError {
    #[error("Already connected to {device}")]
    AlreadyConnected { device: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Unable to open {device} at {baud_rate} baud: {source}")]
    TransportOpenFailed {
        device: String,
        baud_rate: u32,
        #[source]
        source: PortError,
    },

    #[error("Unable to read from {device}: {source}")]
    TransportReadFailed {
        device: String,
        #[source]
        source: PortError,
    },

    #[error("Unable to transmit to {device}: {source}")]
    TransportWriteFailed {
        device: String,
        #[source]
        source: PortError,
    },

    #[error("Unable to close {device}: {source}")]
    TransportCloseFailed {
        device: String,
        #[source]
        source: PortError,
    },

    /// The OS refused to create the receive thread; the device was closed again.
    #[error("Unable to spawn receive loop for {device}: {source}")]
    ReceiveLoopSpawn {
        device: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` or `stop` was called from inside a listener callback.
    #[error("start/stop cannot be called from the receive loop")]
    ReentrantLifecycle,
}

impl CommsError {
    /// `true` for failures caused by the handler's connection state rather
    /// than by the transport.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyConnected { .. } | Self::NotConnected | Self::ReentrantLifecycle
        )
    }
}

/// Result type for handler operations.
pub type CommsResult<T> = Result<T, CommsError>;
