//! Core traits for the native transport abstraction.
//!
//! Defines the `NativeTransport` trait that allows both the real serial driver
//! and mock implementations to be used interchangeably by the comms handler.

use super::error::PortError;
use std::fmt;
use std::time::Duration;

/// Baud rates accepted by the serial driver.
///
/// These are the termios speeds that every supported platform maps directly.
pub const SUPPORTED_BAUD_RATES: [u32; 9] = [
    1200, 2400, 4800, 9600, 57600, 115200, 230400, 460800, 921600,
];

/// Returns `true` if `baud_rate` is one of [`SUPPORTED_BAUD_RATES`].
pub fn is_supported_baud_rate(baud_rate: u32) -> bool {
    SUPPORTED_BAUD_RATES.contains(&baud_rate)
}

/// Opaque identifier for a device opened through a [`NativeTransport`].
///
/// Only meaningful to the transport that issued it, and only until that
/// transport closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(u64);

impl DeviceHandle {
    /// Wrap a raw transport-specific identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw transport-specific identifier.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The platform serial driver, reduced to the four operations the comms
/// handler needs.
///
/// Methods take `&self` because the receive loop reads while callers write on
/// the same handle; implementations must tolerate one concurrent `read_with_timeout`
/// and one concurrent `write` per handle. The handler guarantees that `close`
/// is never called while a read or write on that handle is in flight.
pub trait NativeTransport: Send + Sync + fmt::Debug + 'static {
    /// Open `device` at `baud_rate` and return a handle for it.
    fn open(&self, device: &str, baud_rate: u32) -> Result<DeviceHandle, PortError>;

    /// Read whatever arrives within `timeout` into `buffer`.
    ///
    /// Returns the number of bytes written to the front of `buffer`; `Ok(0)`
    /// means nothing arrived before the timeout and is not an error.
    fn read_with_timeout(
        &self,
        handle: DeviceHandle,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, PortError>;

    /// Write all of `data`, blocking until it has been handed to the device.
    ///
    /// Either every byte is written or an error is returned.
    fn write(&self, handle: DeviceHandle, data: &[u8]) -> Result<(), PortError>;

    /// Close the device. The handle is invalid afterwards even if this fails.
    fn close(&self, handle: DeviceHandle) -> Result<(), PortError>;
}
