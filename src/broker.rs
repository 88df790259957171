//! The broker ties registry, log, publisher and replay to one store and one
//! transport.

use crate::config::BrokerConfig;
use crate::error::Result;
use crate::messages::MessageLog;
use crate::publisher::{PublishReport, Publisher};
use crate::registry::SubscriptionRegistry;
use crate::replay::{CatchUp, ReplayReport};
use crate::store::RecordStore;
use crate::time::{Clock, CreatedAt, SystemClock};
use crate::transport::Transport;
use crate::types::validate_request;
use std::sync::Arc;

/// Entry point for subscribe, publish and unsubscribe.
///
/// Holds no per-request state: every call reads and writes through the
/// record store, so one broker can serve concurrent callers and several
/// brokers can share a store.
pub struct Broker {
    config: BrokerConfig,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    registry: Arc<SubscriptionRegistry>,
    log: Arc<MessageLog>,
    publisher: Publisher,
    catch_up: CatchUp,
}

impl Broker {
    /// Create a broker on wall-clock time.
    pub fn new(
        config: BrokerConfig,
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::with_clock(config, store, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: BrokerConfig,
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.connection_ttl,
        ));
        let log = Arc::new(MessageLog::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.message_ttl,
            config.ordering_jitter,
            config.append_attempts,
        ));
        let publisher = Publisher::new(
            Arc::clone(&log),
            Arc::clone(&registry),
            Arc::clone(&transport),
        );
        let catch_up = CatchUp::new(Arc::clone(&registry), Arc::clone(&log), transport);

        Self {
            config,
            store,
            clock,
            registry,
            log,
            publisher,
            catch_up,
        }
    }

    /// Subscribe a connection, replaying messages after `cursor` if given.
    pub fn subscribe(
        &self,
        topic: &str,
        connection_id: &str,
        cursor: Option<CreatedAt>,
    ) -> Result<ReplayReport> {
        self.catch_up.subscribe_and_catch_up(topic, connection_id, cursor)
    }

    /// Append a message and fan it out to live subscribers.
    pub fn publish(
        &self,
        topic: &str,
        publisher_connection_id: &str,
        payload: &[u8],
    ) -> Result<PublishReport> {
        self.publisher.publish(topic, publisher_connection_id, payload)
    }

    /// Drop a subscription before it expires.
    pub fn unsubscribe(&self, topic: &str, connection_id: &str) -> Result<bool> {
        validate_request(topic, connection_id)?;
        self.registry.unregister(topic, connection_id)
    }

    /// Ask the store to reclaim everything past its expiry.
    ///
    /// Hosts call this on their own schedule; the broker never sweeps.
    pub fn reclaim_expired(&self) -> Result<usize> {
        let reclaimed = self.store.reclaim_expired(self.clock.now())?;
        tracing::info!(reclaimed, "reclaimed expired records");
        Ok(reclaimed)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }
}
