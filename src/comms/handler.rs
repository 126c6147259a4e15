//! The comms handler: connection lifecycle, transmit and listener management.

use super::buffer::{ReceiveBuffer, DEFAULT_RX_BUFFER_SIZE};
use super::error::{CommsError, CommsResult};
use super::listeners::{ByteListener, ListenerId, ListenerRegistry};
use super::receive_loop::{LoopSignal, LoopStats, ReceiveLoop};
use crate::port::{DeviceHandle, NativeTransport, SerialportTransport};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, trace, warn};

/// Default bound on a single receive-loop read, and so on `stop` latency.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Whether the handler currently has an open device and a running receive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Tunables fixed for the lifetime of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerSettings {
    /// Capacity of the receive buffer, i.e. the largest single dispatch.
    pub rx_buffer_size: usize,
    /// Timeout of each bounded read in the receive loop.
    pub read_timeout: Duration,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            rx_buffer_size: DEFAULT_RX_BUFFER_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

struct Session {
    device: String,
    baud_rate: u32,
    handle: DeviceHandle,
    receive_loop: JoinHandle<LoopStats>,
}

/// Duplex serial transport.
///
/// `start` opens the device and spawns a receive loop that pushes every
/// non-empty read to the registered listeners; `transmit` writes from the
/// caller's thread; `stop` ends the loop, waits for it, then closes the
/// device. All methods take `&self`, so the handler can be shared behind an
/// `Arc` and used from listener callbacks. A callback of this handler may
/// `transmit` and manage listeners, but its own `start`/`stop` are rejected;
/// other handlers can be driven freely.
///
/// # Example
/// ```
/// use serial_comms_handler::comms::{ByteListener, CommsHandler};
/// use serial_comms_handler::port::MockTransport;
///
/// struct Printer;
/// impl ByteListener for Printer {
///     fn on_bytes(&self, bytes: &[u8]) {
///         println!("received {} bytes", bytes.len());
///     }
/// }
///
/// let transport = MockTransport::new();
/// let handler = CommsHandler::new(transport.clone());
/// handler.add_listener(Printer);
///
/// handler.start("MOCK0", 57600)?;
/// handler.transmit(b"Hello world!")?;
/// handler.stop()?;
///
/// assert_eq!(transport.writes(), vec![b"Hello world!".to_vec()]);
/// # Ok::<(), serial_comms_handler::comms::CommsError>(())
/// ```
pub struct CommsHandler<T: NativeTransport> {
    transport: Arc<T>,
    settings: HandlerSettings,
    listeners: ListenerRegistry,
    /// The receive loop's only stop signal.
    signal: Arc<LoopSignal>,
    /// Held for the whole of `start`/`stop`, so a new loop cannot be spawned
    /// while the previous one is still being joined.
    lifecycle: Mutex<()>,
    /// Read-locked by `transmit`, write-locked to connect or disconnect; a
    /// write therefore never overlaps the handle being closed.
    session: RwLock<Option<Session>>,
    last_stats: Mutex<Option<LoopStats>>,
}

impl CommsHandler<SerialportTransport> {
    /// Handler over the real serial driver.
    pub fn serial(settings: HandlerSettings) -> Self {
        Self::with_settings(SerialportTransport::new(), settings)
    }
}

impl<T: NativeTransport> CommsHandler<T> {
    pub fn new(transport: T) -> Self {
        Self::with_settings(transport, HandlerSettings::default())
    }

    pub fn with_settings(transport: T, settings: HandlerSettings) -> Self {
        Self {
            transport: Arc::new(transport),
            settings,
            listeners: ListenerRegistry::new(),
            signal: Arc::new(LoopSignal::new()),
            lifecycle: Mutex::new(()),
            session: RwLock::new(None),
            last_stats: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> HandlerSettings {
        self.settings
    }

    pub fn state(&self) -> ConnectionState {
        if self.signal.is_running() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The device currently connected, if any.
    pub fn device(&self) -> Option<String> {
        self.session.read().as_ref().map(|s| s.device.clone())
    }

    /// Statistics of the most recently stopped receive loop.
    pub fn last_session_stats(&self) -> Option<LoopStats> {
        *self.last_stats.lock()
    }

    /// Open `device` at `baud_rate` and start the receive loop.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` if a device is open; the transport is not touched.
    /// - `TransportOpenFailed` if the driver refuses; the handler stays disconnected.
    /// - `ReceiveLoopSpawn` if the thread cannot be created; the device is closed again.
    /// - `ReentrantLifecycle` if called from one of this handler's listener callbacks.
    pub fn start(&self, device: &str, baud_rate: u32) -> CommsResult<()> {
        if self.signal.is_current_thread() {
            return Err(CommsError::ReentrantLifecycle);
        }
        let _lifecycle = self.lifecycle.lock();
        let mut session = self.session.write();

        if let Some(active) = session.as_ref() {
            warn!(
                device = %active.device,
                baud_rate = active.baud_rate,
                "start requested while already connected"
            );
            return Err(CommsError::AlreadyConnected {
                device: active.device.clone(),
            });
        }

        let handle = self
            .transport
            .open(device, baud_rate)
            .map_err(|source| CommsError::TransportOpenFailed {
                device: device.to_string(),
                baud_rate,
                source,
            })?;

        self.signal.arm();
        let receive_loop = ReceiveLoop::new(
            Arc::clone(&self.transport),
            device,
            handle,
            ReceiveBuffer::with_capacity(self.settings.rx_buffer_size),
            self.listeners.clone(),
            Arc::clone(&self.signal),
            self.settings.read_timeout,
        );

        let join = match receive_loop.spawn() {
            Ok(join) => join,
            Err(source) => {
                self.signal.disarm();
                if let Err(e) = self.transport.close(handle) {
                    warn!(device, error = %e, "close after failed spawn also failed");
                }
                return Err(CommsError::ReceiveLoopSpawn {
                    device: device.to_string(),
                    source,
                });
            }
        };

        *session = Some(Session {
            device: device.to_string(),
            baud_rate,
            handle,
            receive_loop: join,
        });
        info!(device, baud_rate, "connected");
        Ok(())
    }

    /// Write `bytes` to the device from the calling thread.
    ///
    /// A write failure leaves the handler connected.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if no device is open; the transport is not touched.
    /// - `TransportWriteFailed` with the driver's error.
    pub fn transmit(&self, bytes: &[u8]) -> CommsResult<()> {
        let session = self.session.read();
        let active = session.as_ref().ok_or(CommsError::NotConnected)?;

        self.transport
            .write(active.handle, bytes)
            .map_err(|source| CommsError::TransportWriteFailed {
                device: active.device.clone(),
                source,
            })?;

        trace!(device = %active.device, bytes = bytes.len(), "transmitted");
        Ok(())
    }

    /// Stop the receive loop, wait for it to exit, then close the device.
    ///
    /// When this returns no listener will be called again for this session.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if no device is open; the transport is not touched.
    /// - `TransportCloseFailed` if the driver fails to close. The handler is
    ///   disconnected and the handle discarded regardless.
    /// - `ReentrantLifecycle` if called from one of this handler's listener callbacks.
    pub fn stop(&self) -> CommsResult<()> {
        if self.signal.is_current_thread() {
            return Err(CommsError::ReentrantLifecycle);
        }
        let _lifecycle = self.lifecycle.lock();

        let session = {
            let mut guard = self.session.write();
            let Some(session) = guard.take() else {
                warn!("stop requested while not connected");
                return Err(CommsError::NotConnected);
            };
            self.signal.disarm();
            session
        };

        let Session {
            device,
            handle,
            receive_loop,
            ..
        } = session;

        match receive_loop.join() {
            Ok(stats) => {
                info!(
                    device = %device,
                    reads = stats.reads,
                    bytes = stats.bytes_received,
                    dispatches = stats.dispatches,
                    read_errors = stats.read_errors,
                    "receive loop stopped"
                );
                *self.last_stats.lock() = Some(stats);
            }
            Err(_) => error!(device = %device, "receive loop panicked"),
        }

        self.transport
            .close(handle)
            .map_err(|source| CommsError::TransportCloseFailed {
                device: device.clone(),
                source,
            })?;

        info!(device = %device, "disconnected");
        Ok(())
    }

    /// Register a listener for received bytes.
    pub fn add_listener<L: ByteListener + 'static>(&self, listener: L) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Register a listener the caller keeps a reference to.
    pub fn add_shared_listener(&self, listener: Arc<dyn ByteListener>) -> ListenerId {
        self.listeners.add_shared(listener)
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn clear_listeners(&self) {
        self.listeners.clear()
    }

    /// A handle to the listener set, e.g. for a listener to remove itself.
    pub fn listeners(&self) -> ListenerRegistry {
        self.listeners.clone()
    }
}

impl<T: NativeTransport> Drop for CommsHandler<T> {
    fn drop(&mut self) {
        if self.session.get_mut().is_none() {
            return;
        }
        if let Err(e) = self.stop() {
            warn!(error = %e, "stop on drop failed");
            self.signal.disarm();
        }
    }
}

impl<T: NativeTransport> std::fmt::Debug for CommsHandler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommsHandler")
            .field("state", &self.state())
            .field("device", &self.device())
            .field("listeners", &self.listeners.len())
            .field("transport", &self.transport)
            .finish()
    }
}
