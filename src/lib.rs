//! # fanlog
//!
//! Topic publish/subscribe over persistent client connections, backed by a
//! durable per-topic message log.
//!
//! ## Core Concepts
//!
//! - **Subscriptions**: (topic, connection) pairs that expire unless refreshed
//! - **Message log**: per-topic append log with collision-free ordering keys
//! - **Fan-out**: a publish is durable once logged; delivery is best-effort
//! - **Catch-up**: a reconnecting client passes the last key it saw and gets
//!   everything newer, oldest first
//!
//! Storage and connections are reached through the [`RecordStore`] and
//! [`Transport`] traits; every invocation is stateless.
//!
//! ## Example
//!
//! ```ignore
//! use fanlog::{Broker, BrokerConfig, ChannelTransport, MemoryStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let transport = Arc::new(ChannelTransport::new());
//! let broker = Broker::new(
//!     BrokerConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     transport.clone(),
//! );
//!
//! let alice = transport.connect();
//! broker.handle(&alice.id, br#"{"action":"subscribe","topic":"room1"}"#);
//! broker.handle("bob", br#"{"action":"publish","topic":"room1","data":"hello"}"#);
//!
//! let delivery = alice.next_delivery(Duration::from_millis(100)).unwrap();
//! assert_eq!(delivery.data, "hello");
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod handler;
pub mod messages;
pub mod publisher;
pub mod registry;
pub mod replay;
pub mod store;
pub mod time;
pub mod transport;
pub mod types;

// Re-exports
pub use broker::Broker;
pub use config::BrokerConfig;
pub use error::{DeliveryFailure, FanlogError, Result};
pub use handler::{Request, Response};
pub use messages::MessageLog;
pub use publisher::{PublishReport, Publisher};
pub use registry::SubscriptionRegistry;
pub use replay::{CatchUp, ReplayReport};
pub use store::{FileStore, FileStoreConfig, MemoryStore, PartitionIndex, RecordStore};
pub use time::{Clock, CreatedAt, ManualClock, SystemClock, Timestamp};
pub use transport::{ChannelTransport, ConnectionHandle, Transport};
pub use types::{Delivery, Item, MessageRecord, SortKey, SubscriptionRecord, Table};
