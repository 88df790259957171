//! Broker configuration.

use crate::time::{DURATION_HOUR, DURATION_MINUTE, DURATION_MONTH};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// How many times an append retries when its ordering key is taken.
const DEFAULT_APPEND_ATTEMPTS: u32 = 16;

/// Broker configuration.
///
/// Durations deserialize from a number of seconds, e.g.
/// `{"connection_ttl": 3600, "message_ttl": 86400}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Lifetime of a subscription after its last (re-)subscribe.
    #[serde(deserialize_with = "seconds")]
    pub connection_ttl: Duration,

    /// Retention window of published messages.
    #[serde(deserialize_with = "seconds")]
    pub message_ttl: Duration,

    /// Upper bound of the random offset added to a message's ordering key.
    #[serde(deserialize_with = "seconds")]
    pub ordering_jitter: Duration,

    /// Upper bound on conditional-put attempts per append.
    pub append_attempts: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            connection_ttl: DURATION_HOUR * 2 + DURATION_MINUTE,
            message_ttl: DURATION_MONTH * 2,
            ordering_jitter: Duration::from_millis(1),
            append_attempts: DEFAULT_APPEND_ATTEMPTS,
        }
    }
}

impl BrokerConfig {
    pub fn with_connection_ttl(mut self, ttl: Duration) -> Self {
        self.connection_ttl = ttl;
        self
    }

    pub fn with_message_ttl(mut self, ttl: Duration) -> Self {
        self.message_ttl = ttl;
        self
    }

    pub fn with_ordering_jitter(mut self, jitter: Duration) -> Self {
        self.ordering_jitter = jitter;
        self
    }

    /// Parse from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::FanlogError::InvalidFormat(format!("broker config: {e}")))
    }
}

fn seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
