//! In-process transport: one bounded channel per connection.

use super::Transport;
use crate::error::DeliveryFailure;
use crate::types::Delivery;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default per-connection buffer, in payloads.
const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Connections reachable through channels.
pub struct ChannelTransport {
    /// Live connections by ID.
    connections: RwLock<HashMap<String, Sender<Vec<u8>>>>,
    /// Counter for generating connection IDs.
    next_id: AtomicU64,
    buffer_size: usize,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Open a connection with a generated ID.
    pub fn connect(&self) -> ConnectionHandle {
        let id = format!("conn-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.connect_as(id)
    }

    /// Open a connection under a caller-chosen ID, replacing any previous
    /// connection with the same ID.
    pub fn connect_as(&self, id: impl Into<String>) -> ConnectionHandle {
        let id = id.into();
        let (sender, receiver) = bounded(self.buffer_size);
        self.connections.write().insert(id.clone(), sender);
        ConnectionHandle { id, receiver }
    }

    /// Forget a connection. Later pushes to it fail with `Gone`.
    pub fn disconnect(&self, id: &str) -> bool {
        self.connections.write().remove(id).is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ChannelTransport {
    fn push(&self, connection_id: &str, payload: &[u8]) -> Result<(), DeliveryFailure> {
        let sender = self
            .connections
            .read()
            .get(connection_id)
            .cloned()
            .ok_or_else(|| DeliveryFailure::Gone(connection_id.to_string()))?;

        match sender.try_send(payload.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(DeliveryFailure::Backlogged(connection_id.to_string()))
            }
            Err(TrySendError::Disconnected(_)) => {
                // Receiver dropped. Forget the ID unless it was reconnected.
                let mut connections = self.connections.write();
                if connections
                    .get(connection_id)
                    .is_some_and(|current| current.same_channel(&sender))
                {
                    connections.remove(connection_id);
                }
                Err(DeliveryFailure::Closed(connection_id.to_string()))
            }
        }
    }
}

/// Client side of a channel connection.
pub struct ConnectionHandle {
    pub id: String,
    /// Channel receiving pushed payloads.
    pub receiver: Receiver<Vec<u8>>,
}

impl ConnectionHandle {
    /// Try to receive a payload (non-blocking).
    pub fn try_recv(&self) -> Result<Vec<u8>, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Vec<u8>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Receive the next payload and decode it as a delivery.
    ///
    /// Returns `None` on timeout or if the payload is not a delivery.
    pub fn next_delivery(&self, timeout: Duration) -> Option<Delivery> {
        let bytes = self.recv_timeout(timeout).ok()?;
        Delivery::decode(&bytes).ok()
    }

    /// Everything received so far, decoded.
    pub fn drain_deliveries(&self) -> Vec<Delivery> {
        self.receiver
            .try_iter()
            .filter_map(|bytes| Delivery::decode(&bytes).ok())
            .collect()
    }
}
