//! Tests requiring actual serial hardware.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export TEST_PORT=/dev/ttyUSB0          # or COM3 on Windows
//! export TEST_BAUD=115200                # optional, default: 9600
//! export TEST_LOOPBACK=1                 # if the port has TX and RX joined
//!
//! cargo test --features hardware-tests -- --ignored
//! ```

use super::utils::{print_available_ports, TestPortConfig};
use crate::common::{Collector, WAIT_LIMIT};
use serial_comms_handler::comms::{CommsError, CommsHandler, HandlerSettings};
use serial_comms_handler::port::{NativeTransport, SerialportTransport};
use std::time::{Duration, Instant};

#[test]
#[ignore] // Run with --ignored flag
fn test_real_port_open_close() {
    let Some(cfg) = TestPortConfig::from_env() else {
        return;
    };
    print_available_ports();

    let transport = SerialportTransport::new();
    let handle = transport
        .open(&cfg.port_name, cfg.baud_rate)
        .unwrap_or_else(|e| panic!("open {} failed: {}", cfg.port_name, e));
    assert_eq!(transport.open_count(), 1);

    let mut buffer = [0u8; 64];
    let started = Instant::now();
    transport
        .read_with_timeout(handle, &mut buffer, Duration::from_millis(50))
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    transport.close(handle).unwrap();
    assert_eq!(transport.open_count(), 0);
}

#[test]
#[ignore]
fn test_real_port_handler_lifecycle() {
    let Some(cfg) = TestPortConfig::from_env() else {
        return;
    };

    let handler = CommsHandler::serial(HandlerSettings::default());
    handler.start(&cfg.port_name, cfg.baud_rate).unwrap();
    assert!(matches!(
        handler.start(&cfg.port_name, cfg.baud_rate),
        Err(CommsError::AlreadyConnected { .. })
    ));
    handler.transmit(b"AT\r\n").unwrap();

    let started = Instant::now();
    handler.stop().unwrap();
    println!("stop took {:?}", started.elapsed());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
#[ignore]
fn test_real_port_loopback() {
    let Some(cfg) = TestPortConfig::from_env() else {
        return;
    };
    if !cfg.loopback_enabled {
        println!("Skipping loopback test: TEST_LOOPBACK not set");
        return;
    }

    let handler = CommsHandler::serial(HandlerSettings::default());
    let collector = Collector::new();
    handler.add_shared_listener(collector.clone());
    handler.start(&cfg.port_name, cfg.baud_rate).unwrap();

    let message = b"Hello world!";
    handler.transmit(message).unwrap();

    // the echo may arrive split across reads
    let deadline = Instant::now() + WAIT_LIMIT;
    while collector.chunks().concat().len() < message.len() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    handler.stop().unwrap();

    assert_eq!(collector.chunks().concat(), message.to_vec());
}
