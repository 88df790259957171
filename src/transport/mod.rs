//! Push primitive toward client connections.
//!
//! The core never owns connections; it only asks a [`Transport`] to push
//! bytes to a connection ID and accepts that the push may fail.
//!
//! # Example
//!
//! ```ignore
//! let transport = ChannelTransport::new();
//! let conn = transport.connect();
//!
//! transport.push(&conn.id, b"{}")?;
//! let bytes = conn.recv_timeout(Duration::from_millis(100))?;
//! ```

mod channel;

pub use channel::{ChannelTransport, ConnectionHandle};

use crate::error::DeliveryFailure;

/// Per-connection push.
///
/// A failure means the connection is stale, gone or cannot accept the
/// payload. Implementations must return it rather than panic.
pub trait Transport: Send + Sync {
    fn push(&self, connection_id: &str, payload: &[u8]) -> Result<(), DeliveryFailure>;
}
