//! Serial Comms Handler Library
//!
//! A duplex serial-port transport: a background receive loop pushes every
//! non-empty read to registered listeners while callers transmit
//! synchronously.
//!
//! # Modules
//!
//! - `comms`: The comms handler, receive loop, receive buffer and listener registry
//! - `port`: Native transport abstraction, `serialport`-backed driver and mock
//! - `config`: Configuration management with TOML support
//! - `logging`: Tracing subscriber setup

pub mod comms;
pub mod config;
pub mod logging;
pub mod port;

// Re-export commonly used types for convenience
pub use comms::{
    ByteListener, CommsError, CommsHandler, CommsResult, ConnectionState, HandlerSettings,
    ListenerId, ListenerRegistry, LoopStats,
};
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use port::{
    DeviceHandle, MockTransport, NativeTransport, PortError, ReadStep, SerialportTransport,
};
