//! Sorted in-memory index of items, keyed by (table, partition, sort key).

use crate::time::Timestamp;
use crate::types::{Item, SortKey, Table};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Items of one partition, in sort-key order.
type Partition = BTreeMap<SortKey, Item>;

/// Index backing both store implementations.
#[derive(Default)]
pub struct PartitionIndex {
    partitions: HashMap<(Table, String), Partition>,
}

impl PartitionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns the previous item under the same key.
    pub fn insert(&mut self, table: Table, item: Item) -> Option<Item> {
        self.partitions
            .entry((table, item.partition.clone()))
            .or_default()
            .insert(item.sort.clone(), item)
    }

    pub fn contains(&self, table: Table, partition: &str, sort: &SortKey) -> bool {
        self.partition(table, partition)
            .map(|p| p.contains_key(sort))
            .unwrap_or(false)
    }

    /// Items with a sort key strictly greater than `after`, ascending.
    pub fn range_after(&self, table: Table, partition: &str, after: Option<&SortKey>) -> Vec<Item> {
        let Some(items) = self.partition(table, partition) else {
            return Vec::new();
        };
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        items
            .range::<SortKey, _>((lower, Bound::Unbounded))
            .map(|(_, item)| item.clone())
            .collect()
    }

    /// Item with the greatest sort key in the partition.
    pub fn last(&self, table: Table, partition: &str) -> Option<Item> {
        self.partition(table, partition)
            .and_then(|p| p.values().next_back())
            .cloned()
    }

    pub fn remove(&mut self, table: Table, partition: &str, sort: &SortKey) -> Option<Item> {
        let key = (table, partition.to_string());
        let items = self.partitions.get_mut(&key)?;
        let removed = items.remove(sort);
        if items.is_empty() {
            self.partitions.remove(&key);
        }
        removed
    }

    /// Drop every item whose expiry has passed. Returns how many were dropped.
    pub fn drain_expired(&mut self, now: Timestamp) -> usize {
        let mut dropped = 0;
        self.partitions.retain(|_, items| {
            let before = items.len();
            items.retain(|_, item| !item.expires_at.has_passed(now));
            dropped += before - items.len();
            !items.is_empty()
        });
        dropped
    }

    /// Every item, grouped by table.
    pub fn iter(&self) -> impl Iterator<Item = (Table, &Item)> {
        self.partitions
            .iter()
            .flat_map(|((table, _), items)| items.values().map(move |item| (*table, item)))
    }

    pub fn count(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }

    fn partition(&self, table: Table, partition: &str) -> Option<&Partition> {
        self.partitions.get(&(table, partition.to_string()))
    }
}
