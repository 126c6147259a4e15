//! Native transport backed by the `serialport` crate.
//!
//! Each open device is split into a reader half and a writer half (via
//! `try_clone`) so the receive loop and `transmit` never wait on each other.

use super::error::PortError;
use super::traits::{is_supported_baud_rate, DeviceHandle, NativeTransport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Timeout applied when the device is first opened, before any bounded read
/// sets its own.
const OPEN_TIMEOUT: Duration = Duration::from_millis(100);

/// An open device, split into independently lockable halves.
struct OpenDevice {
    name: String,
    reader: Mutex<Box<dyn serialport::SerialPort>>,
    writer: Mutex<Box<dyn serialport::SerialPort>>,
}

/// Real serial driver: 8 data bits, no parity, one stop bit, no flow control.
pub struct SerialportTransport {
    devices: Mutex<HashMap<DeviceHandle, Arc<OpenDevice>>>,
    next_handle: AtomicU64,
}

impl SerialportTransport {
    /// Create a transport with no open devices.
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Number of devices currently open through this transport.
    pub fn open_count(&self) -> usize {
        self.devices.lock().len()
    }

    fn device(&self, handle: DeviceHandle) -> Result<Arc<OpenDevice>, PortError> {
        self.devices
            .lock()
            .get(&handle)
            .cloned()
            .ok_or(PortError::InvalidHandle(handle))
    }
}

impl Default for SerialportTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeTransport for SerialportTransport {
    fn open(&self, device: &str, baud_rate: u32) -> Result<DeviceHandle, PortError> {
        if !is_supported_baud_rate(baud_rate) {
            return Err(PortError::UnsupportedBaudRate(baud_rate));
        }

        let reader = serialport::new(device, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(|e| PortError::from_open_error(device, e))?;
        let writer = reader.try_clone().map_err(PortError::Serial)?;

        let handle = DeviceHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let open = Arc::new(OpenDevice {
            name: device.to_string(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        });
        self.devices.lock().insert(handle, open);

        debug!(device, baud_rate, %handle, "serial device opened");
        Ok(handle)
    }

    fn read_with_timeout(
        &self,
        handle: DeviceHandle,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, PortError> {
        let device = self.device(handle)?;
        let mut reader = device.reader.lock();

        if reader.timeout() != timeout {
            reader.set_timeout(timeout).map_err(PortError::Serial)?;
        }

        match reader.read(buffer) {
            Ok(n) => {
                trace!(device = %device.name, bytes = n, "read");
                Ok(n)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                Err(PortError::disconnected(device.name.clone()))
            }
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn write(&self, handle: DeviceHandle, data: &[u8]) -> Result<(), PortError> {
        if data.is_empty() {
            return Ok(());
        }

        let device = self.device(handle)?;
        let mut writer = device.writer.lock();

        // write_all retries short writes and EINTR; anything else aborts the whole write
        writer.write_all(data).map_err(|e| match e.kind() {
            ErrorKind::BrokenPipe => PortError::disconnected(device.name.clone()),
            _ => PortError::Io(e),
        })?;
        writer.flush().map_err(PortError::Io)?;

        trace!(device = %device.name, bytes = data.len(), "wrote");
        Ok(())
    }

    fn close(&self, handle: DeviceHandle) -> Result<(), PortError> {
        let device = self
            .devices
            .lock()
            .remove(&handle)
            .ok_or(PortError::InvalidHandle(handle))?;

        // The port itself closes when the last half is dropped.
        let drained = device.writer.lock().flush();
        debug!(device = %device.name, %handle, "serial device closed");
        drained.map_err(PortError::Io)
    }
}

impl std::fmt::Debug for SerialportTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialportTransport")
            .field("open_devices", &self.open_count())
            .finish()
    }
}

/// Enumerate the serial devices visible to the OS.
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, PortError> {
    serialport::available_ports().map_err(PortError::Serial)
}
