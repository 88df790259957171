//! Process-local record store.

use super::{check_key, PartitionIndex, RecordStore};
use crate::error::Result;
use crate::time::Timestamp;
use crate::types::{Item, SortKey, Table};
use parking_lot::RwLock;

/// Record store held entirely in memory.
///
/// Expired items stay visible until [`RecordStore::reclaim_expired`] runs.
#[derive(Default)]
pub struct MemoryStore {
    index: RwLock<PartitionIndex>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items, expired or not.
    pub fn len(&self) -> usize {
        self.index.read().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn put(&self, table: Table, item: Item) -> Result<()> {
        check_key(&item)?;
        self.index.write().insert(table, item);
        Ok(())
    }

    fn put_if_absent(&self, table: Table, item: Item) -> Result<bool> {
        check_key(&item)?;
        let mut index = self.index.write();
        if index.contains(table, &item.partition, &item.sort) {
            return Ok(false);
        }
        index.insert(table, item);
        Ok(true)
    }

    fn query_range(
        &self,
        table: Table,
        partition: &str,
        after: Option<&SortKey>,
    ) -> Result<Vec<Item>> {
        Ok(self.index.read().range_after(table, partition, after))
    }

    fn last(&self, table: Table, partition: &str) -> Result<Option<Item>> {
        Ok(self.index.read().last(table, partition))
    }

    fn delete(&self, table: Table, partition: &str, sort: &SortKey) -> Result<bool> {
        Ok(self.index.write().remove(table, partition, sort).is_some())
    }

    fn reclaim_expired(&self, now: Timestamp) -> Result<usize> {
        Ok(self.index.write().drain_expired(now))
    }
}
