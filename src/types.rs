//! Core types: store items, the two record kinds, and the delivery payload.

use crate::time::{CreatedAt, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reject requests that name no topic or no connection.
pub fn validate_request(topic: &str, connection_id: &str) -> crate::Result<()> {
    if topic.is_empty() {
        return Err(crate::FanlogError::InvalidRequest("topic is required".into()));
    }
    if connection_id.is_empty() {
        return Err(crate::FanlogError::InvalidRequest(
            "connection id is required".into(),
        ));
    }
    Ok(())
}

/// Which logical table an item lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Table {
    /// Partition = topic, sort = connection ID.
    Subscriptions,
    /// Partition = topic, sort = created_at.
    Messages,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Subscriptions => "subscriptions",
            Table::Messages => "messages",
        }
    }
}

/// Sort key within a partition.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SortKey {
    Text(String),
    Time(CreatedAt),
}

impl fmt::Debug for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Text(s) => write!(f, "Text({s})"),
            SortKey::Time(t) => write!(f, "Time({})", t.0),
        }
    }
}

/// One stored item, as the record store sees it.
///
/// `body` is opaque to the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub partition: String,
    pub sort: SortKey,
    /// After this time the store may reclaim the item.
    pub expires_at: Timestamp,
    pub body: Vec<u8>,
}

/// One (topic, connection) pairing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub topic: String,
    pub connection_id: String,
    pub expires_at: Timestamp,
}

impl SubscriptionRecord {
    pub fn to_item(&self) -> Item {
        Item {
            partition: self.topic.clone(),
            sort: SortKey::Text(self.connection_id.clone()),
            expires_at: self.expires_at,
            body: Vec::new(),
        }
    }

    /// Rebuild from a store item. Items with a non-text sort key are rejected.
    pub fn from_item(item: Item) -> Option<Self> {
        match item.sort {
            SortKey::Text(connection_id) => Some(Self {
                topic: item.partition,
                connection_id,
                expires_at: item.expires_at,
            }),
            SortKey::Time(_) => None,
        }
    }
}

/// Fields of a message that live in the item body.
#[derive(Serialize, Deserialize)]
struct MessageBody {
    publisher: String,
    payload: Vec<u8>,
}

/// One published message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    pub topic: String,
    pub created_at: CreatedAt,
    pub publisher_connection_id: String,
    /// Publisher-supplied bytes, never interpreted by the core.
    pub payload: Vec<u8>,
    pub expires_at: Timestamp,
}

impl MessageRecord {
    pub fn to_item(&self) -> crate::Result<Item> {
        let body = rmp_serde::to_vec(&MessageBody {
            publisher: self.publisher_connection_id.clone(),
            payload: self.payload.clone(),
        })?;
        Ok(Item {
            partition: self.topic.clone(),
            sort: SortKey::Time(self.created_at),
            expires_at: self.expires_at,
            body,
        })
    }

    pub fn from_item(item: Item) -> crate::Result<Self> {
        let created_at = match item.sort {
            SortKey::Time(t) => t,
            SortKey::Text(other) => {
                return Err(crate::FanlogError::Corruption(format!(
                    "message item in {} keyed by text {:?}",
                    item.partition, other
                )))
            }
        };
        let body: MessageBody = rmp_serde::from_slice(&item.body)?;
        Ok(Self {
            topic: item.partition,
            created_at,
            publisher_connection_id: body.publisher,
            payload: body.payload,
            expires_at: item.expires_at,
        })
    }
}

/// What a subscriber receives for every message.
///
/// `data` is the publisher's payload, embedded verbatim as JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Delivery {
    pub topic: String,
    pub created_at: f64,
    pub data: serde_json::Value,
}

impl Delivery {
    /// Encode a message for the wire.
    ///
    /// Payloads that are not valid JSON are delivered as a JSON string of
    /// their UTF-8 (lossy) text.
    pub fn encode(topic: &str, created_at: CreatedAt, payload: &[u8]) -> Vec<u8> {
        let data = serde_json::from_slice(payload).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(payload).into_owned())
        });
        let delivery = Delivery {
            topic: topic.to_string(),
            created_at: created_at.as_secs_f64(),
            data,
        };
        // Serializing a Value-backed struct cannot fail.
        serde_json::to_vec(&delivery).unwrap_or_default()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn cursor(&self) -> Option<CreatedAt> {
        CreatedAt::from_secs_f64(self.created_at)
    }
}
