//! Fixed-capacity append log with ring-buffer eviction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::VecDeque;

use crate::domain::models::Timestamped;

/// Append-only log holding at most `capacity` records.
///
/// Appending to a full log evicts the oldest record. Time-based retention is
/// applied separately through [`BoundedLog::prune_older_than`], so the two
/// limits are independent.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedLog<T> {
    records: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedLog<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Build from records in chronological order, keeping the newest
    /// `capacity` of them.
    pub fn from_records(records: Vec<T>, capacity: usize) -> Self {
        let mut log = Self::new(capacity);
        for record in records {
            log.push(record);
        }
        log
    }

    /// Append a record, returning the evicted oldest record if the log was full.
    pub fn push(&mut self, record: T) -> Option<T> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.records.iter()
    }

    /// The newest `n` records, oldest first.
    pub fn latest(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip)
    }

    /// Change the capacity, evicting the oldest records if it shrank.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }
}

impl<T: Clone> BoundedLog<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.records.iter().cloned().collect()
    }
}

impl<T: Timestamped> BoundedLog<T> {
    /// Drop records older than `cutoff`. Returns how many were removed.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.timestamp() >= cutoff);
        before - self.records.len()
    }
}

impl<T: Serialize> Serialize for BoundedLog<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.records.iter())
    }
}

/// Deserializes as an unbounded log; the store re-applies its configured
/// capacity after loading.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for BoundedLog<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = Vec::<T>::deserialize(deserializer)?;
        let capacity = records.len().max(1);
        Ok(Self::from_records(records, capacity))
    }
}
