//! Native transport layer for serial communication.
//!
//! Provides the `NativeTransport` trait, the `serialport`-backed driver and a
//! scriptable mock, so the comms handler can be exercised without hardware.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockTransport, ReadStep, TransportCall};
pub use sync_port::{list_ports, SerialportTransport};
pub use traits::*;
