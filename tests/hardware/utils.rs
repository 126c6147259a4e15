//! Utility functions for hardware testing.

use serial_comms_handler::port::list_ports;
use std::env;

/// Test port configuration from environment.
pub struct TestPortConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub loopback_enabled: bool,
}

impl TestPortConfig {
    /// Read `TEST_PORT`, `TEST_BAUD` (default 9600) and `TEST_LOOPBACK=1`.
    ///
    /// Returns `None`, after printing why, when no port is configured.
    pub fn from_env() -> Option<Self> {
        let Ok(port_name) = env::var("TEST_PORT") else {
            println!("Skipping hardware test: TEST_PORT not set");
            return None;
        };
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(9600);
        let loopback_enabled = env::var("TEST_LOOPBACK").ok().as_deref() == Some("1");

        Some(TestPortConfig {
            port_name,
            baud_rate,
            loopback_enabled,
        })
    }
}

/// Print available ports for debugging.
pub fn print_available_ports() {
    match list_ports() {
        Ok(ports) if ports.is_empty() => println!("No serial ports found"),
        Ok(ports) => {
            println!("Available serial ports:");
            for port in ports {
                println!("  {} ({:?})", port.port_name, port.port_type);
            }
        }
        Err(e) => println!("Port enumeration failed: {}", e),
    }
}
