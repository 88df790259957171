//! Request envelope decoding and status mapping.
//!
//! The transport hands the broker a raw message body and the ID of the
//! connection that sent it. Bodies are JSON objects routed on `action`:
//!
//! ```text
//! {"action": "subscribe",   "topic": "room1", "last_created_at": 1700000000.25}
//! {"action": "publish",     "topic": "room1", "data": {"any": "json"}}
//! {"action": "unsubscribe", "topic": "room1"}
//! ```

use crate::broker::Broker;
use crate::error::FanlogError;
use crate::time::CreatedAt;
use serde::{Deserialize, Serialize};

/// A decoded client request.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    Subscribe {
        topic: String,
        #[serde(default)]
        last_created_at: Option<f64>,
    },
    Publish {
        topic: String,
        #[serde(default)]
        data: serde_json::Value,
    },
    Unsubscribe {
        topic: String,
    },
}

impl Request {
    pub fn decode(body: &[u8]) -> Result<Self, FanlogError> {
        serde_json::from_slice(body).map_err(|e| FanlogError::InvalidRequest(e.to_string()))
    }

    pub fn topic(&self) -> &str {
        match self {
            Request::Subscribe { topic, .. }
            | Request::Publish { topic, .. }
            | Request::Unsubscribe { topic } => topic,
        }
    }
}

/// Status returned to the transport for one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Response {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            body: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    fn from_error(e: &FanlogError) -> Self {
        let status_code = if e.is_client_error() { 400 } else { 500 };
        Self {
            status_code,
            body: Some(e.to_string()),
        }
    }
}

impl Broker {
    /// Decode and run one request from `connection_id`.
    ///
    /// Success means the durable part of the request happened; it says
    /// nothing about how many subscribers a message reached.
    pub fn handle(&self, connection_id: &str, body: &[u8]) -> Response {
        let result = Request::decode(body).and_then(|request| {
            tracing::debug!(connection_id, topic = request.topic(), "handling request");
            self.dispatch(connection_id, request)
        });

        match result {
            Ok(()) => Response::ok(),
            Err(e) => {
                if e.is_client_error() {
                    tracing::debug!(connection_id, error = %e, "rejected request");
                } else {
                    tracing::warn!(connection_id, error = %e, "request failed");
                }
                Response::from_error(&e)
            }
        }
    }

    fn dispatch(&self, connection_id: &str, request: Request) -> Result<(), FanlogError> {
        match request {
            Request::Subscribe {
                topic,
                last_created_at,
            } => {
                let cursor = match last_created_at {
                    Some(secs) => Some(CreatedAt::from_secs_f64(secs).ok_or_else(|| {
                        FanlogError::InvalidRequest("last_created_at must be finite".into())
                    })?),
                    None => None,
                };
                let report = self.subscribe(&topic, connection_id, cursor)?;
                if !report.failures.is_empty() {
                    tracing::info!(
                        topic = %topic,
                        connection_id,
                        failed = report.failures.len(),
                        "some replay pushes failed"
                    );
                }
            }
            Request::Publish { topic, data } => {
                let payload = serde_json::to_vec(&data)?;
                let report = self.publish(&topic, connection_id, &payload)?;
                if !report.failures.is_empty() {
                    tracing::info!(
                        topic = %topic,
                        failed = report.failures.len(),
                        delivered = report.delivered(),
                        "some deliveries failed"
                    );
                }
            }
            Request::Unsubscribe { topic } => {
                self.unsubscribe(&topic, connection_id)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_subscribe_with_cursor() {
        let request =
            Request::decode(br#"{"action":"subscribe","topic":"room1","last_created_at":12.5}"#)
                .unwrap();
        match request {
            Request::Subscribe {
                topic,
                last_created_at,
            } => {
                assert_eq!(topic, "room1");
                assert_eq!(last_created_at, Some(12.5));
            }
            other => panic!("Expected Subscribe, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_publish_without_data() {
        let request = Request::decode(br#"{"action":"publish","topic":"room1"}"#).unwrap();
        match request {
            Request::Publish { data, .. } => assert!(data.is_null()),
            other => panic!("Expected Publish, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_missing_topic_and_unknown_action() {
        for body in [
            &br#"{"action":"subscribe"}"#[..],
            &br#"{"action":"shout","topic":"room1"}"#[..],
            &b"not json"[..],
        ] {
            assert!(matches!(
                Request::decode(body),
                Err(FanlogError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_response_status() {
        assert!(Response::ok().is_success());
        let bad = Response::from_error(&FanlogError::InvalidRequest("x".into()));
        assert_eq!(bad.status_code, 400);
        let failed = Response::from_error(&FanlogError::StoreWrite("x".into()));
        assert_eq!(failed.status_code, 500);
    }
}
