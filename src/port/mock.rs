//! Mock native transport for testing.
//!
//! Provides a `MockTransport` that simulates a serial driver without
//! requiring hardware. Reads follow a script that tests can extend while a
//! receive loop is running; every call is recorded for later inspection.

use super::error::PortError;
use super::traits::{DeviceHandle, NativeTransport};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One scripted outcome of `read_with_timeout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStep {
    /// Deliver these bytes (split across reads if larger than the buffer).
    Data(Vec<u8>),
    /// Return `Ok(0)` immediately, as if the timeout elapsed with no data.
    Empty,
    /// Fail the read with an I/O error of this kind.
    Fail(io::ErrorKind),
}

/// A call made against the mock, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Open { device: String, baud_rate: u32 },
    Read(DeviceHandle),
    Write(DeviceHandle, Vec<u8>),
    Close(DeviceHandle),
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<ReadStep>,
    calls: Vec<TransportCall>,
    open_handles: HashSet<DeviceHandle>,
    next_handle: u64,
    open_failure: Option<io::ErrorKind>,
    write_failure: Option<io::ErrorKind>,
    close_failure: Option<io::ErrorKind>,
    reads_in_flight: usize,
    close_overlapped_read: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MockState>,
    data_ready: Condvar,
}

/// Scriptable in-memory transport.
///
/// When the read script is empty, a read blocks for its full timeout (or
/// until a test enqueues more steps) and then reports no data, like an idle
/// serial line.
///
/// # Example
/// ```
/// use serial_comms_handler::port::{MockTransport, NativeTransport};
/// use std::time::Duration;
///
/// let transport = MockTransport::new();
/// let handle = transport.open("MOCK0", 57600).unwrap();
///
/// transport.enqueue_read(b"Hello");
/// let mut buffer = [0u8; 16];
/// let n = transport
///     .read_with_timeout(handle, &mut buffer, Duration::from_millis(10))
///     .unwrap();
/// assert_eq!(&buffer[..n], b"Hello");
///
/// transport.write(handle, b"Response").unwrap();
/// assert_eq!(transport.writes(), vec![b"Response".to_vec()]);
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a mock with an empty script and no failures configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append scripted read outcomes and wake any blocked read.
    pub fn script<I>(&self, steps: I)
    where
        I: IntoIterator<Item = ReadStep>,
    {
        let mut state = self.shared.state.lock();
        state.script.extend(steps);
        self.shared.data_ready.notify_all();
    }

    /// Append bytes to be returned by a subsequent read.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.script([ReadStep::Data(data.to_vec())]);
    }

    /// Make every `open` fail with this kind until cleared with `None`.
    ///
    /// `NotFound` and `PermissionDenied` map to the matching [`PortError`]
    /// variants; other kinds surface as [`PortError::Io`].
    pub fn set_open_failure(&self, kind: Option<io::ErrorKind>) {
        self.shared.state.lock().open_failure = kind;
    }

    /// Make every `write` fail with this kind until cleared with `None`.
    pub fn set_write_failure(&self, kind: Option<io::ErrorKind>) {
        self.shared.state.lock().write_failure = kind;
    }

    /// Make every `close` fail with this kind until cleared with `None`.
    ///
    /// The handle is still released, matching the transport contract.
    pub fn set_close_failure(&self, kind: Option<io::ErrorKind>) {
        self.shared.state.lock().close_failure = kind;
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.shared.state.lock().calls.clone()
    }

    /// Payloads of every successful write, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared
            .state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Write(_, data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `open` calls, successful or not.
    pub fn open_calls(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Open { .. }))
    }

    /// Number of `read_with_timeout` calls.
    pub fn read_calls(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Read(_)))
    }

    /// Number of `close` calls, successful or not.
    pub fn close_calls(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Close(_)))
    }

    /// Whether `handle` is currently open.
    pub fn is_open(&self, handle: DeviceHandle) -> bool {
        self.shared.state.lock().open_handles.contains(&handle)
    }

    /// Whether `close` was ever called while a read was still in progress.
    pub fn close_overlapped_read(&self) -> bool {
        self.shared.state.lock().close_overlapped_read
    }

    /// Scripted read steps not yet consumed.
    pub fn pending_reads(&self) -> usize {
        self.shared.state.lock().script.len()
    }

    fn count(&self, pred: impl Fn(&TransportCall) -> bool) -> usize {
        self.shared.state.lock().calls.iter().filter(|&c| pred(c)).count()
    }
}

fn injected(kind: io::ErrorKind, device: &str, op: &str) -> PortError {
    match kind {
        io::ErrorKind::NotFound => PortError::not_found(device),
        io::ErrorKind::PermissionDenied => PortError::PermissionDenied(device.to_string()),
        _ => PortError::Io(io::Error::new(kind, format!("injected {op} failure"))),
    }
}

impl NativeTransport for MockTransport {
    fn open(&self, device: &str, baud_rate: u32) -> Result<DeviceHandle, PortError> {
        let mut state = self.shared.state.lock();
        state.calls.push(TransportCall::Open {
            device: device.to_string(),
            baud_rate,
        });

        if let Some(kind) = state.open_failure {
            return Err(injected(kind, device, "open"));
        }

        state.next_handle += 1;
        let handle = DeviceHandle::from_raw(state.next_handle);
        state.open_handles.insert(handle);
        Ok(handle)
    }

    fn read_with_timeout(
        &self,
        handle: DeviceHandle,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, PortError> {
        let mut state = self.shared.state.lock();
        if !state.open_handles.contains(&handle) {
            return Err(PortError::InvalidHandle(handle));
        }
        state.calls.push(TransportCall::Read(handle));
        state.reads_in_flight += 1;

        let deadline = Instant::now() + timeout;
        while state.script.is_empty() {
            if self
                .shared
                .data_ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }

        let result = match state.script.pop_front() {
            None | Some(ReadStep::Empty) => Ok(0),
            Some(ReadStep::Data(bytes)) => {
                let n = bytes.len().min(buffer.len());
                buffer[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    state.script.push_front(ReadStep::Data(bytes[n..].to_vec()));
                }
                Ok(n)
            }
            Some(ReadStep::Fail(kind)) => Err(PortError::Io(io::Error::new(
                kind,
                "injected read failure",
            ))),
        };

        state.reads_in_flight -= 1;
        result
    }

    fn write(&self, handle: DeviceHandle, data: &[u8]) -> Result<(), PortError> {
        let mut state = self.shared.state.lock();
        if !state.open_handles.contains(&handle) {
            return Err(PortError::InvalidHandle(handle));
        }
        if let Some(kind) = state.write_failure {
            return Err(injected(kind, "mock", "write"));
        }

        state.calls.push(TransportCall::Write(handle, data.to_vec()));
        Ok(())
    }

    fn close(&self, handle: DeviceHandle) -> Result<(), PortError> {
        let mut state = self.shared.state.lock();
        state.calls.push(TransportCall::Close(handle));
        if state.reads_in_flight > 0 {
            state.close_overlapped_read = true;
        }

        if !state.open_handles.remove(&handle) {
            return Err(PortError::InvalidHandle(handle));
        }
        if let Some(kind) = state.close_failure {
            return Err(injected(kind, "mock", "close"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("MockTransport")
            .field("open_handles", &state.open_handles.len())
            .field("pending_reads", &state.script.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}
