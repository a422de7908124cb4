//! Real-time socket layer.
//!
//! One logical connection per authenticated identity, with automatic
//! reconnect and exponential backoff. Incoming frames are decoded and
//! written straight into the reconciliation store; consumers read from the
//! store, never from the socket.
//!
//! ```text
//!   ConnectionManager ── Transport (tokio-tungstenite or a test fake)
//!          │
//!          ▼ decoded InboundEvents
//!      SyncStore ──► subscribers (chat pane, inbox, badge)
//! ```

mod connection;
mod transport;

pub use connection::{ConnectionManager, ConnectionStatus, ReconnectConfig};
pub use transport::{FrameSink, FrameStream, Transport, WsTransport};
