//! Unit of work over one store coordinator
//!
//! The context overlays uncommitted changes on the coordinator's committed
//! objects. Reads always see the overlay; `commit` hands every pending change
//! to the coordinator as one frame and forgets them only when that succeeds.
//!
//! Updates and deletes of committed objects remember the revision they were
//! made against. If another context commits over that object first, this
//! context's commit is refused and its changes stay pending.
//!
//! A context is plain mutable state. It is never shared: its environment
//! serializes access with a recursive lock.

use std::collections::HashMap;
use std::sync::Arc;

use super::errors::{ContextError, ContextResult};
use super::pending::{PendingChange, PendingSummary};
use crate::model::{Model, RecordValidator};
use crate::query::FetchRequest;
use crate::store::{
    BaseRevision, Change, CommitReceipt, Fields, ObjectId, Record, StoreCoordinator,
};

/// In-memory unit of work bound to one coordinator
pub struct PersistenceContext {
    model: Arc<Model>,
    coordinator: Arc<dyn StoreCoordinator>,
    pending: HashMap<ObjectId, (u64, PendingChange)>,
    bases: HashMap<ObjectId, u64>,
    next_seq: u64,
}

impl PersistenceContext {
    /// Creates an empty context
    pub fn new(model: Arc<Model>, coordinator: Arc<dyn StoreCoordinator>) -> Self {
        Self {
            model,
            coordinator,
            pending: HashMap::new(),
            bases: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Model the context validates against
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Coordinator commits go to
    pub fn coordinator(&self) -> &Arc<dyn StoreCoordinator> {
        &self.coordinator
    }

    fn track(&mut self, change: PendingChange) {
        let id = change.record().id;
        // An object keeps its first position among pending changes
        let seq = match self.pending.get(&id) {
            Some((seq, _)) => *seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.pending.insert(id, (seq, change));
    }

    /// Adds a new object. Unknown entities are rejected immediately; field
    /// validation waits until commit.
    pub fn insert(&mut self, entity: &str, fields: Fields) -> ContextResult<Record> {
        RecordValidator::new(&self.model).check_entity(entity)?;
        let record = Record::new(entity, fields);
        self.track(PendingChange::Insert(record.clone()));
        Ok(record)
    }

    /// Merges `changes` into an existing object
    pub fn update(&mut self, id: &ObjectId, changes: Fields) -> ContextResult<Record> {
        let pending = self.pending.get(id).map(|(_, change)| change.clone());

        let updated = match pending {
            Some(PendingChange::Insert(mut record)) => {
                record.merge(changes);
                self.track(PendingChange::Insert(record.clone()));
                record
            }
            Some(PendingChange::Update(mut record)) => {
                record.merge(changes);
                self.track(PendingChange::Update(record.clone()));
                record
            }
            Some(PendingChange::Delete(_)) => return Err(ContextError::ObjectNotFound(*id)),
            None => {
                let mut record = self.read_committed(id)?;
                record.merge(changes);
                self.track(PendingChange::Update(record.clone()));
                record
            }
        };

        Ok(updated)
    }

    /// Schedules an object for removal. Deleting an uncommitted insert simply
    /// forgets it.
    pub fn delete(&mut self, id: &ObjectId) -> ContextResult<()> {
        let pending = self.pending.get(id).map(|(_, change)| change.clone());

        match pending {
            Some(PendingChange::Insert(_)) => {
                self.pending.remove(id);
            }
            Some(PendingChange::Update(record)) => {
                self.track(PendingChange::Delete(record));
            }
            Some(PendingChange::Delete(_)) => return Err(ContextError::ObjectNotFound(*id)),
            None => {
                let record = self.read_committed(id)?;
                self.track(PendingChange::Delete(record));
            }
        }

        Ok(())
    }

    fn read_committed(&mut self, id: &ObjectId) -> ContextResult<Record> {
        let (record, revision) = self
            .coordinator
            .get_versioned(id)
            .ok_or(ContextError::ObjectNotFound(*id))?;
        self.bases.insert(*id, revision);
        Ok(record)
    }

    /// Current view of one object, pending changes included
    pub fn object(&self, id: &ObjectId) -> Option<Record> {
        match self.pending.get(id) {
            Some((_, change)) => change.visible().cloned(),
            None => self.coordinator.get(id),
        }
    }

    /// Runs `request` over committed objects overlaid with pending changes.
    ///
    /// Without sort keys, committed objects come first in insertion order,
    /// followed by pending inserts in the order they were made.
    pub fn fetch(&self, request: &FetchRequest) -> ContextResult<Vec<Record>> {
        RecordValidator::new(&self.model).check_entity(&request.entity)?;

        let mut rows: Vec<Record> = self
            .coordinator
            .snapshot(&request.entity)
            .into_iter()
            .filter_map(|committed| match self.pending.get(&committed.id) {
                Some((_, change)) => change.visible().cloned(),
                None => Some(committed),
            })
            .collect();

        let mut inserts: Vec<(u64, &Record)> = self
            .pending
            .values()
            .filter_map(|(seq, change)| match change {
                PendingChange::Insert(record) if record.entity == request.entity => {
                    Some((*seq, record))
                }
                _ => None,
            })
            .collect();
        inserts.sort_by_key(|(seq, _)| *seq);
        rows.extend(inserts.into_iter().map(|(_, record)| record.clone()));

        Ok(request.apply(rows))
    }

    /// Number of objects `request` would return
    pub fn count(&self, request: &FetchRequest) -> ContextResult<usize> {
        Ok(self.fetch(request)?.len())
    }

    /// True when something is pending
    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Counts of pending changes by kind
    pub fn pending_summary(&self) -> PendingSummary {
        let mut summary = PendingSummary::default();
        for (_, change) in self.pending.values() {
            match change {
                PendingChange::Insert(_) => summary.inserted += 1,
                PendingChange::Update(_) => summary.updated += 1,
                PendingChange::Delete(_) => summary.deleted += 1,
            }
        }
        summary
    }

    /// Pending changes in the order they were first made
    pub fn changes(&self) -> Vec<Change> {
        let mut ordered: Vec<&(u64, PendingChange)> = self.pending.values().collect();
        ordered.sort_by_key(|(seq, _)| *seq);
        ordered.into_iter().map(|(_, change)| change.to_change()).collect()
    }

    /// Validates every record that would be written
    pub fn validate(&self) -> ContextResult<()> {
        let validator = RecordValidator::new(&self.model);
        for (_, change) in self.pending.values() {
            if let Some(record) = change.visible() {
                validator.validate(record)?;
            }
        }
        Ok(())
    }

    /// Validates and commits every pending change as one unit.
    ///
    /// Pending changes are cleared only when the coordinator reports success.
    pub fn commit(&mut self) -> ContextResult<CommitReceipt> {
        self.validate()?;
        let changes = self.changes();
        let expected: Vec<BaseRevision> = self
            .bases
            .iter()
            .map(|(id, revision)| BaseRevision {
                id: *id,
                revision: *revision,
            })
            .collect();
        let receipt = self.coordinator.commit(&changes, &expected)?;
        self.pending.clear();
        self.bases.clear();
        Ok(receipt)
    }

    /// Discards every pending change
    pub fn rollback(&mut self) {
        self.pending.clear();
        self.bases.clear();
    }
}

impl std::fmt::Debug for PersistenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceContext")
            .field("model", &self.model.tag())
            .field("store", &self.coordinator.path())
            .field("pending", &self.pending.len())
            .finish()
    }
}
