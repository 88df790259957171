//! Record store adapter.
//!
//! The core reaches durable storage only through [`RecordStore`]: single-item
//! upserts keyed by (partition, sort key), and range queries within one
//! partition with an exclusive lower bound. Every item carries an absolute
//! expiry time; reclaiming expired items is the store's business, so readers
//! must still filter on `expires_at` themselves.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`]: process-local, for tests and single-process hosts
//! - [`FileStore`]: an append-only, checksummed log replayed on open

mod file;
mod index;
mod memory;

pub use file::{FileStore, FileStoreConfig};
pub use index::PartitionIndex;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::time::Timestamp;
use crate::types::{Item, SortKey, Table};

/// Durable sorted key-range store.
///
/// Each call touches at most one item and is atomic with respect to
/// concurrent callers. Write failures surface as `StoreWrite`, read failures
/// as `StoreRead`.
pub trait RecordStore: Send + Sync {
    /// Insert or overwrite the item with the same (partition, sort) key.
    fn put(&self, table: Table, item: Item) -> Result<()>;

    /// Insert only if no item holds the key yet. Returns false if one did.
    fn put_if_absent(&self, table: Table, item: Item) -> Result<bool>;

    /// Items of `partition` with a sort key strictly greater than `after`,
    /// in ascending sort-key order. `None` starts from the beginning.
    fn query_range(&self, table: Table, partition: &str, after: Option<&SortKey>)
        -> Result<Vec<Item>>;

    /// The item with the greatest sort key in `partition`.
    fn last(&self, table: Table, partition: &str) -> Result<Option<Item>>;

    /// Remove one item. Returns whether it existed.
    fn delete(&self, table: Table, partition: &str, sort: &SortKey) -> Result<bool>;

    /// Physically drop items whose expiry has passed. Returns how many.
    fn reclaim_expired(&self, now: Timestamp) -> Result<usize>;
}

pub(crate) fn check_key(item: &Item) -> Result<()> {
    if item.partition.is_empty() {
        return Err(crate::FanlogError::StoreWrite(
            "partition key must not be empty".into(),
        ));
    }
    if let SortKey::Text(ref s) = item.sort {
        if s.is_empty() {
            return Err(crate::FanlogError::StoreWrite(
                "sort key must not be empty".into(),
            ));
        }
    }
    Ok(())
}
