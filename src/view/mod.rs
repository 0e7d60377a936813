//! Ordered, id-unique record cache backing one dashboard view.
//!
//! A collection is rebuilt from a full fetch when the view mounts, then
//! incrementally maintained by the reconciler for the view's lifetime.
//! Reconciliation never reorders on update: replacing an existing record
//! keeps its position, new records are prepended so recent activity surfaces
//! first, and only explicit sorts reorder.

pub mod membership;

use std::cmp::Ordering;

use chrono::DateTime;
use im::Vector;
use serde_json::Value;

use crate::core::{Record, RecordId};

#[derive(Debug, Clone, Default)]
pub struct ViewCollection {
    records: Vector<Record>,
}

impl ViewCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the collection from a mount-time full fetch, keeping the
    /// server's order.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    /// Inserts or replaces by id. Idempotent: applying the same record
    /// twice leaves the collection unchanged after the first call.
    pub fn upsert(&mut self, record: Record) {
        match self.position(&record.id) {
            Some(index) => {
                self.records.set(index, record);
            }
            None => self.records.push_front(record),
        }
    }

    /// Removes the record with `id`. No-op when absent.
    pub fn evict(&mut self, id: &RecordId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.records.remove(index);
                true
            }
            None => false,
        }
    }

    /// Cheap ordered snapshot (persistent-structure clone).
    pub fn snapshot(&self) -> Vector<Record> {
        self.records.clone()
    }

    pub fn find(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|record| &record.id == id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn sort_by<F>(&mut self, cmp: F)
    where
        F: Fn(&Record, &Record) -> Ordering,
    {
        self.records.sort_by(cmp);
    }

    fn position(&self, id: &RecordId) -> Option<usize> {
        self.records.iter().position(|record| &record.id == id)
    }
}

/// Comparator sorting newest-first by an instant-typed field, e.g.
/// `createdAt`. Records without a parseable instant sink to the back.
pub fn newest_first(key: impl Into<String>) -> impl Fn(&Record, &Record) -> Ordering {
    let key = key.into();
    move |a, b| instant_of(a, &key).cmp(&instant_of(b, &key)).reverse()
}

fn instant_of(record: &Record, key: &str) -> Option<i64> {
    record
        .field(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|instant| instant.timestamp_millis())
}
