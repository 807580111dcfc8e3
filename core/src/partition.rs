//! Output partitioner.
//!
//! Pure grouping: records keep their input order inside each partition and
//! partitions come out in key order.

use crate::types::{format_date, EntityIndex};
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionKey {
    Date(NaiveDate),
    /// Zero-based batch of `batch_size` consecutive entities.
    EntityBatch(u32),
}

impl PartitionKey {
    pub fn entity_batch(index: EntityIndex, batch_size: usize) -> Self {
        Self::EntityBatch(index / batch_size.max(1) as u32)
    }

    /// `customer_events_2023-01-05`, `customer_status_batch_0001`.
    pub fn file_stem(&self, prefix: &str) -> String {
        match self {
            Self::Date(date) => format!("{prefix}_{}", format_date(date)),
            Self::EntityBatch(batch) => format!("{prefix}_batch_{:04}", batch + 1),
        }
    }
}

pub fn partition_by<T, F>(records: impl IntoIterator<Item = T>, key: F) -> Vec<(PartitionKey, Vec<T>)>
where
    F: Fn(&T) -> PartitionKey,
{
    let mut groups: BTreeMap<PartitionKey, Vec<T>> = BTreeMap::new();
    for record in records {
        groups.entry(key(&record)).or_default().push(record);
    }
    groups.into_iter().collect()
}
