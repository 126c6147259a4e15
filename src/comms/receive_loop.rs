//! Background receive loop.
//!
//! One thread per connection: clear the buffer, bounded read, fan out
//! non-empty reads, re-check the stop signal. The signal is the only way to
//! end the loop; the bounded read timeout caps how long `stop` waits for the
//! thread.

use super::buffer::ReceiveBuffer;
use super::error::CommsError;
use super::listeners::ListenerRegistry;
use crate::port::{DeviceHandle, NativeTransport};
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info_span, trace, warn};

static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the signal whose loop runs on this thread, if any.
    static CURRENT_LOOP: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Run/stop flag shared by one handler and the receive loops it spawns.
///
/// `disarm` also wakes a loop that is backing off after a read error, so the
/// backoff never extends `stop` past the in-flight read.
#[derive(Debug)]
pub(crate) struct LoopSignal {
    id: u64,
    running: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl LoopSignal {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed),
            running: AtomicBool::new(false),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn arm(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub(crate) fn disarm(&self) {
        self.running.store(false, Ordering::Release);
        let _guard = self.lock.lock();
        self.wake.notify_all();
    }

    /// `true` when called from a loop driven by this signal, i.e. from one of
    /// its handler's listener callbacks.
    pub(crate) fn is_current_thread(&self) -> bool {
        CURRENT_LOOP.with(Cell::get) == Some(self.id)
    }

    /// Wait up to `timeout`, returning early once disarmed.
    fn pause(&self, timeout: Duration) {
        let mut guard = self.lock.lock();
        if self.is_running() {
            self.wake.wait_for(&mut guard, timeout);
        }
    }
}

/// Counters accumulated over one receive loop's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Bounded reads attempted.
    pub reads: u64,
    /// Reads that returned no data within the timeout.
    pub idle_reads: u64,
    /// Total bytes handed to listeners.
    pub bytes_received: u64,
    /// Dispatch passes (one per non-empty read).
    pub dispatches: u64,
    /// Reads that failed and were retried.
    pub read_errors: u64,
    /// Listener callbacks that panicked.
    pub listener_panics: u64,
}

pub(crate) struct ReceiveLoop<T> {
    transport: Arc<T>,
    device: String,
    handle: DeviceHandle,
    buffer: ReceiveBuffer,
    listeners: ListenerRegistry,
    signal: Arc<LoopSignal>,
    read_timeout: Duration,
}

impl<T: NativeTransport> ReceiveLoop<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        device: &str,
        handle: DeviceHandle,
        buffer: ReceiveBuffer,
        listeners: ListenerRegistry,
        signal: Arc<LoopSignal>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            device: device.to_string(),
            handle,
            buffer,
            listeners,
            signal,
            read_timeout,
        }
    }

    pub(crate) fn spawn(self) -> io::Result<JoinHandle<LoopStats>> {
        thread::Builder::new()
            .name(format!("rx-{}", self.device))
            .spawn(move || self.run())
    }

    fn run(mut self) -> LoopStats {
        CURRENT_LOOP.with(|current| current.set(Some(self.signal.id)));
        let span = info_span!("receive_loop", device = %self.device, handle = %self.handle);
        let _enter = span.enter();
        debug!("receive loop started");

        let mut stats = LoopStats::default();
        while self.signal.is_running() {
            self.buffer.clear();

            let transport = &self.transport;
            let handle = self.handle;
            let timeout = self.read_timeout;
            let read = self
                .buffer
                .fill_with(|storage| transport.read_with_timeout(handle, storage, timeout));
            stats.reads += 1;

            match read {
                Ok(0) => stats.idle_reads += 1,
                Ok(n) => {
                    let outcome = self.listeners.dispatch(self.buffer.as_slice());
                    stats.bytes_received += n as u64;
                    stats.dispatches += 1;
                    stats.listener_panics += outcome.panicked as u64;
                    trace!(bytes = n, notified = outcome.notified, "dispatched");
                }
                Err(source) => {
                    stats.read_errors += 1;
                    let err = CommsError::TransportReadFailed {
                        device: self.device.clone(),
                        source,
                    };
                    warn!(error = %err, "read failed, retrying");
                    // back off one timeout so a vanished device does not spin
                    self.signal.pause(self.read_timeout);
                }
            }
        }

        debug!(?stats, "receive loop exiting");
        stats
    }
}
