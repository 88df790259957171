//! Shared fixtures for integration tests.

#![allow(dead_code)]

use fanlog::{
    Broker, BrokerConfig, ChannelTransport, DeliveryFailure, FanlogError, Item, ManualClock,
    MemoryStore, RecordStore, SortKey, Table, Timestamp, Transport,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 2023-11-14T22:13:20Z
pub const START: Timestamp = Timestamp(1_700_000_000_000_000);

pub struct Harness {
    pub broker: Broker,
    pub store: Arc<FlakyStore>,
    pub transport: Arc<ChannelTransport>,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    harness_with(BrokerConfig::default().with_ordering_jitter(Duration::ZERO))
}

/// Route broker logs through the test harness; run with `--nocapture` to
/// see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn harness_with(config: BrokerConfig) -> Harness {
    init_tracing();
    let store = Arc::new(FlakyStore::new());
    let transport = Arc::new(ChannelTransport::new());
    let clock = Arc::new(ManualClock::new(START));
    let broker = Broker::with_clock(config, store.clone(), transport.clone(), clock.clone());
    Harness {
        broker,
        store,
        transport,
        clock,
    }
}

/// A memory store whose writes, range queries and last-item lookups can each
/// be made to fail on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    fail_queries: AtomicBool,
    fail_lookups: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn items(&self, table: Table, partition: &str) -> Vec<Item> {
        self.inner.query_range(table, partition, None).unwrap()
    }

    fn check_write(&self) -> fanlog::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(FanlogError::StoreWrite("injected write failure".into()))
        } else {
            Ok(())
        }
    }

    fn check_query(&self) -> fanlog::Result<()> {
        if self.fail_queries.load(Ordering::SeqCst) {
            Err(FanlogError::StoreRead("injected read failure".into()))
        } else {
            Ok(())
        }
    }
}

impl RecordStore for FlakyStore {
    fn put(&self, table: Table, item: Item) -> fanlog::Result<()> {
        self.check_write()?;
        self.inner.put(table, item)
    }

    fn put_if_absent(&self, table: Table, item: Item) -> fanlog::Result<bool> {
        self.check_write()?;
        self.inner.put_if_absent(table, item)
    }

    fn query_range(
        &self,
        table: Table,
        partition: &str,
        after: Option<&SortKey>,
    ) -> fanlog::Result<Vec<Item>> {
        self.check_query()?;
        self.inner.query_range(table, partition, after)
    }

    fn last(&self, table: Table, partition: &str) -> fanlog::Result<Option<Item>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(FanlogError::StoreRead("injected lookup failure".into()));
        }
        self.inner.last(table, partition)
    }

    fn delete(&self, table: Table, partition: &str, sort: &SortKey) -> fanlog::Result<bool> {
        self.check_write()?;
        self.inner.delete(table, partition, sort)
    }

    fn reclaim_expired(&self, now: Timestamp) -> fanlog::Result<usize> {
        self.inner.reclaim_expired(now)
    }
}

/// Transport that records every push and fails them all when asked.
#[derive(Default)]
pub struct RecordingTransport {
    pub pushes: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail_all: AtomicBool,
}

impl RecordingTransport {
    pub fn push_count(&self) -> usize {
        self.pushes.lock().len()
    }
}

impl Transport for RecordingTransport {
    fn push(&self, connection_id: &str, payload: &[u8]) -> Result<(), DeliveryFailure> {
        self.pushes
            .lock()
            .push((connection_id.to_string(), payload.to_vec()));
        if self.fail_all.load(Ordering::SeqCst) {
            Err(DeliveryFailure::Gone(connection_id.to_string()))
        } else {
            Ok(())
        }
    }
}
