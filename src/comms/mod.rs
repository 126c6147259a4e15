//! Duplex serial comms: connection lifecycle, receive loop and listener fan-out.
//!
//! ```text
//! caller ── start/stop/transmit ──> CommsHandler ──> NativeTransport
//!                                        │                  ▲
//!                                        └─ spawns ─> ReceiveLoop ── read ─┘
//!                                                         │
//!                                         ListenerRegistry::dispatch(&[u8])
//! ```

mod buffer;
mod error;
mod handler;
mod listeners;
mod receive_loop;

pub use buffer::{ReceiveBuffer, DEFAULT_RX_BUFFER_SIZE};
pub use error::{CommsError, CommsResult};
pub use handler::{CommsHandler, ConnectionState, HandlerSettings, DEFAULT_READ_TIMEOUT};
pub use listeners::{ByteListener, DispatchOutcome, ListenerId, ListenerRegistry};
pub use receive_loop::LoopStats;
