//! Subscription registry: which connections listen to which topics.

use crate::error::{FanlogError, Result};
use crate::store::RecordStore;
use crate::time::{Clock, Timestamp};
use crate::types::{SortKey, SubscriptionRecord, Table};
use std::sync::Arc;
use std::time::Duration;

/// Tracks (topic, connection) pairings with a rolling expiry.
pub struct SubscriptionRegistry {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    connection_ttl: Duration,
}

impl SubscriptionRegistry {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        connection_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            connection_ttl,
        }
    }

    /// Subscribe a connection, or refresh the expiry of an existing
    /// subscription. Returns the new expiry.
    pub fn register(&self, topic: &str, connection_id: &str) -> Result<Timestamp> {
        let record = SubscriptionRecord {
            topic: topic.to_string(),
            connection_id: connection_id.to_string(),
            expires_at: self.clock.now().after(self.connection_ttl),
        };
        self.store
            .put(Table::Subscriptions, record.to_item())
            .map_err(FanlogError::into_write)?;

        tracing::debug!(
            topic,
            connection_id,
            expires_at = record.expires_at.0,
            "registered subscription"
        );
        Ok(record.expires_at)
    }

    /// Live subscriptions of a topic, in connection-ID order.
    ///
    /// Filters out records past their expiry that the store has not yet
    /// reclaimed.
    pub fn live_records(&self, topic: &str) -> Result<Vec<SubscriptionRecord>> {
        let now = self.clock.now();
        let items = self
            .store
            .query_range(Table::Subscriptions, topic, None)
            .map_err(FanlogError::into_read)?;

        Ok(items
            .into_iter()
            .filter(|item| !item.expires_at.has_passed(now))
            .filter_map(SubscriptionRecord::from_item)
            .collect())
    }

    /// Connection IDs with a live subscription to `topic`.
    pub fn list_live(&self, topic: &str) -> Result<Vec<String>> {
        Ok(self
            .live_records(topic)?
            .into_iter()
            .map(|record| record.connection_id)
            .collect())
    }

    /// Remove a subscription. Returns whether one was recorded.
    pub fn unregister(&self, topic: &str, connection_id: &str) -> Result<bool> {
        let key = SortKey::Text(connection_id.to_string());
        let removed = self
            .store
            .delete(Table::Subscriptions, topic, &key)
            .map_err(FanlogError::into_write)?;

        tracing::debug!(topic, connection_id, removed, "unregistered subscription");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::time::{ManualClock, DURATION_MINUTE};

    fn registry() -> (SubscriptionRegistry, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Timestamp(1_000_000)));
        let registry = SubscriptionRegistry::new(store.clone(), clock.clone(), DURATION_MINUTE);
        (registry, store, clock)
    }

    #[test]
    fn test_register_twice_refreshes_expiry() {
        let (registry, _store, clock) = registry();

        registry.register("room1", "a").unwrap();
        clock.advance(Duration::from_secs(30));
        registry.register("room1", "a").unwrap();

        let records = registry.live_records("room1").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].expires_at, clock.now().after(DURATION_MINUTE));
    }

    #[test]
    fn test_expired_subscription_not_listed_before_reclaim() {
        let (registry, store, clock) = registry();

        registry.register("room1", "a").unwrap();
        clock.advance(Duration::from_secs(30));
        registry.register("room1", "b").unwrap();
        clock.advance(Duration::from_secs(31));

        assert_eq!(registry.list_live("room1").unwrap(), vec!["b".to_string()]);
        // Still physically present.
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_topics_are_isolated() {
        let (registry, _store, _clock) = registry();

        registry.register("room1", "a").unwrap();
        registry.register("room2", "b").unwrap();

        assert_eq!(registry.list_live("room1").unwrap(), vec!["a".to_string()]);
        assert_eq!(registry.list_live("room2").unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_unregister() {
        let (registry, _store, _clock) = registry();

        registry.register("room1", "a").unwrap();
        assert!(registry.unregister("room1", "a").unwrap());
        assert!(!registry.unregister("room1", "a").unwrap());
        assert!(registry.list_live("room1").unwrap().is_empty());
    }
}
