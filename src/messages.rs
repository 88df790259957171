//! Durable per-topic message log.
//!
//! Ordering keys start from "now plus a sub-millisecond random offset" but are
//! never allowed to collide: each append takes a key strictly greater than the
//! topic's current last key and claims it with a conditional put, moving to the
//! next free key if a concurrent writer got there first.

use crate::error::{FanlogError, Result};
use crate::store::RecordStore;
use crate::time::{Clock, CreatedAt};
use crate::types::{MessageRecord, SortKey, Table};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Append log of published messages, one ordered partition per topic.
pub struct MessageLog {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    message_ttl: Duration,
    jitter_micros: i64,
    attempts: u32,
}

impl MessageLog {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        message_ttl: Duration,
        ordering_jitter: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            store,
            clock,
            message_ttl,
            jitter_micros: i64::try_from(ordering_jitter.as_micros()).unwrap_or(i64::MAX),
            attempts: attempts.max(1),
        }
    }

    /// Durably append a message and return its ordering key.
    pub fn append(
        &self,
        topic: &str,
        publisher_connection_id: &str,
        payload: &[u8],
    ) -> Result<CreatedAt> {
        let now = self.clock.now();
        let mut record = MessageRecord {
            topic: topic.to_string(),
            created_at: self.next_key(topic, CreatedAt(now.0.saturating_add(self.jitter())))?,
            publisher_connection_id: publisher_connection_id.to_string(),
            payload: payload.to_vec(),
            expires_at: now.after(self.message_ttl),
        };

        for attempt in 1..=self.attempts {
            let inserted = self
                .store
                .put_if_absent(Table::Messages, record.to_item()?)
                .map_err(FanlogError::into_write)?;

            if inserted {
                tracing::debug!(
                    topic,
                    created_at = record.created_at.0,
                    attempt,
                    bytes = record.payload.len(),
                    "appended message"
                );
                return Ok(record.created_at);
            }
            record.created_at = self.next_key(topic, record.created_at.next())?;
        }

        Err(FanlogError::StoreWrite(format!(
            "no free ordering key for topic {topic} after {} attempts",
            self.attempts
        )))
    }

    /// Live messages of `topic` after `after` (exclusive), oldest first.
    ///
    /// `None` returns the whole retained log.
    pub fn query(&self, topic: &str, after: Option<CreatedAt>) -> Result<Vec<MessageRecord>> {
        let now = self.clock.now();
        let lower = after.map(SortKey::Time);
        let items = self
            .store
            .query_range(Table::Messages, topic, lower.as_ref())
            .map_err(FanlogError::into_read)?;

        let mut messages = Vec::with_capacity(items.len());
        for item in items {
            if item.expires_at.has_passed(now) {
                continue;
            }
            match MessageRecord::from_item(item) {
                Ok(message) if after.map_or(true, |a| message.created_at > a) => {
                    messages.push(message)
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(topic, error = %e, "skipping unreadable message"),
            }
        }
        Ok(messages)
    }

    /// Smallest key at or above `candidate` that sorts after the topic's last
    /// stored message.
    fn next_key(&self, topic: &str, candidate: CreatedAt) -> Result<CreatedAt> {
        let last = self
            .store
            .last(Table::Messages, topic)
            .map_err(FanlogError::into_write)?;

        Ok(match last.map(|item| item.sort) {
            Some(SortKey::Time(last)) if last >= candidate => last.next(),
            _ => candidate,
        })
    }

    fn jitter(&self) -> i64 {
        if self.jitter_micros <= 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.jitter_micros)
        }
    }
}
