//! Pending changes held by a unit of work

use serde::Serialize;

use crate::store::{Change, Record};

/// One uncommitted change. Every variant carries the full record it affects.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
    /// New object, never committed
    Insert(Record),
    /// Committed object with modified fields
    Update(Record),
    /// Committed object scheduled for removal
    Delete(Record),
}

impl PendingChange {
    /// The affected record as it will look after commit, `None` for deletes
    pub fn visible(&self) -> Option<&Record> {
        match self {
            PendingChange::Insert(record) | PendingChange::Update(record) => Some(record),
            PendingChange::Delete(_) => None,
        }
    }

    /// The affected record
    pub fn record(&self) -> &Record {
        match self {
            PendingChange::Insert(record)
            | PendingChange::Update(record)
            | PendingChange::Delete(record) => record,
        }
    }

    /// Store-level change
    pub fn to_change(&self) -> Change {
        match self {
            PendingChange::Insert(record) | PendingChange::Update(record) => {
                Change::Upsert(record.clone())
            }
            PendingChange::Delete(record) => Change::Delete {
                id: record.id,
                entity: record.entity.clone(),
            },
        }
    }
}

/// Counts of uncommitted changes by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl PendingSummary {
    /// Total number of pending changes
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
