//! Shared test utilities for comms handler tests.
//!
//! This module provides common test infrastructure including:
//! - A recording listener
//! - Handler construction over the mock transport
//! - Polling helpers for asynchronous conditions

#![allow(dead_code)]

use parking_lot::Mutex;
use serial_comms_handler::comms::{ByteListener, CommsHandler, HandlerSettings};
use serial_comms_handler::port::MockTransport;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Read timeout used by tests: short enough to keep `stop` fast.
pub const TEST_READ_TIMEOUT: Duration = Duration::from_millis(25);

/// Upper bound for waiting on the receive loop in tests.
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

pub fn test_settings() -> HandlerSettings {
    HandlerSettings {
        rx_buffer_size: 256,
        read_timeout: TEST_READ_TIMEOUT,
    }
}

/// Create a handler over a fresh mock, returning both.
pub fn mock_handler() -> (CommsHandler<MockTransport>, MockTransport) {
    let transport = MockTransport::new();
    let handler = CommsHandler::with_settings(transport.clone(), test_settings());
    (handler, transport)
}

/// Listener that copies every chunk it receives.
#[derive(Default)]
pub struct Collector {
    chunks: Mutex<Vec<Vec<u8>>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.chunks.lock().len()
    }

    /// Wait until at least `n` chunks arrived. Panics after [`WAIT_LIMIT`].
    pub fn wait_for(&self, n: usize) {
        wait_until(|| self.count() >= n, "listener notifications");
    }
}

impl ByteListener for Collector {
    fn on_bytes(&self, bytes: &[u8]) {
        self.chunks.lock().push(bytes.to_vec());
    }
}

/// Poll `cond` until it holds. Panics with `what` after [`WAIT_LIMIT`].
pub fn wait_until(cond: impl Fn() -> bool, what: &str) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}
