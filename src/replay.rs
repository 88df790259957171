//! Subscribe with catch-up replay.

use crate::error::{DeliveryFailure, Result};
use crate::messages::MessageLog;
use crate::registry::SubscriptionRegistry;
use crate::time::{CreatedAt, Timestamp};
use crate::transport::Transport;
use crate::types::{validate_request, Delivery};
use std::sync::Arc;

/// Outcome of a successful subscribe.
#[derive(Clone, Debug)]
pub struct ReplayReport {
    /// When the subscription lapses unless refreshed.
    pub expires_at: Timestamp,
    /// Messages found after the cursor.
    pub found: usize,
    /// Pushes that failed, by message key.
    pub failures: Vec<(CreatedAt, DeliveryFailure)>,
    /// Set when the log could not be read; nothing was replayed.
    pub query_error: Option<String>,
}

impl ReplayReport {
    pub fn replayed(&self) -> usize {
        self.found - self.failures.len()
    }
}

/// Registers subscribers and replays what they missed.
pub struct CatchUp {
    registry: Arc<SubscriptionRegistry>,
    log: Arc<MessageLog>,
    transport: Arc<dyn Transport>,
}

impl CatchUp {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        log: Arc<MessageLog>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            log,
            transport,
        }
    }

    /// Subscribe `connection_id` to `topic` and, given a cursor, push every
    /// retained message newer than it in ascending order.
    ///
    /// Only the registration can fail the call. Replay is best-effort.
    pub fn subscribe_and_catch_up(
        &self,
        topic: &str,
        connection_id: &str,
        cursor: Option<CreatedAt>,
    ) -> Result<ReplayReport> {
        validate_request(topic, connection_id)?;

        let expires_at = self.registry.register(topic, connection_id)?;
        let mut report = ReplayReport {
            expires_at,
            found: 0,
            failures: Vec::new(),
            query_error: None,
        };

        let Some(cursor) = cursor else {
            return Ok(report);
        };

        let messages = match self.log.query(topic, Some(cursor)) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(topic, connection_id, error = %e, "could not read log for replay");
                report.query_error = Some(e.to_string());
                return Ok(report);
            }
        };

        // Sequential so the client sees ascending keys.
        report.found = messages.len();
        for message in &messages {
            let frame = Delivery::encode(topic, message.created_at, &message.payload);
            if let Err(failure) = self.transport.push(connection_id, &frame) {
                tracing::debug!(
                    topic,
                    connection_id,
                    created_at = message.created_at.0,
                    error = %failure,
                    "replay push failed"
                );
                report.failures.push((message.created_at, failure));
            }
        }

        tracing::debug!(
            topic,
            connection_id,
            cursor = cursor.0,
            found = report.found,
            failed = report.failures.len(),
            "replayed messages"
        );
        Ok(report)
    }
}
