//! Persistence environment
//!
//! An environment binds one model, one store coordinator and one persistence
//! context behind a recursive lock. Every operation on the context goes
//! through [`PersistenceEnvironment::with_lock`]:
//! - the thread holding the lock may re-enter it from inside a callback
//! - two threads never run against the same context at once
//! - the context is borrowed only for the duration of a single primitive,
//!   never across a callback
//!
//! Environments hold at most one lock at a time. `copy_to` reads under the
//! source lock, releases it, then reads under the target lock.

use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use super::errors::{EnvError, EnvResult};
use crate::context::{ContextError, PendingSummary, PersistenceContext};
use crate::execution::Affinity;
use crate::model::Model;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, ObservationScope};
use crate::query::FetchRequest;
use crate::recovery::RescueReport;
use crate::registry::InstanceSlot;
use crate::store::{CommitReceipt, Fields, ObjectId, Record, StoreCoordinator};

/// Facade over one model, coordinator and context.
pub struct PersistenceEnvironment {
    id: u64,
    affinity: Affinity,
    share_persistence: bool,
    model: Arc<Model>,
    coordinator: Arc<dyn StoreCoordinator>,
    context: ReentrantMutex<RefCell<PersistenceContext>>,
    metrics: Arc<MetricsRegistry>,
    rescue_report: Option<RescueReport>,
    _slot: Option<InstanceSlot>,
}

/// Parts an environment is assembled from
pub(crate) struct EnvironmentParts {
    pub id: u64,
    pub affinity: Affinity,
    pub share_persistence: bool,
    pub model: Arc<Model>,
    pub coordinator: Arc<dyn StoreCoordinator>,
    pub metrics: Arc<MetricsRegistry>,
    pub rescue_report: Option<RescueReport>,
    pub slot: Option<InstanceSlot>,
}

impl PersistenceEnvironment {
    pub(crate) fn assemble(parts: EnvironmentParts) -> Self {
        let context = PersistenceContext::new(Arc::clone(&parts.model), Arc::clone(&parts.coordinator));
        Self {
            id: parts.id,
            affinity: parts.affinity,
            share_persistence: parts.share_persistence,
            model: parts.model,
            coordinator: parts.coordinator,
            context: ReentrantMutex::new(RefCell::new(context)),
            metrics: parts.metrics,
            rescue_report: parts.rescue_report,
            _slot: parts.slot,
        }
    }

    /// Process-unique environment id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Execution context the environment was created for
    pub fn affinity(&self) -> Affinity {
        self.affinity
    }

    /// Whether the coordinator is pooled with other environments
    pub fn share_persistence(&self) -> bool {
        self.share_persistence
    }

    /// Model handle
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Store coordinator
    pub fn coordinator(&self) -> &Arc<dyn StoreCoordinator> {
        &self.coordinator
    }

    /// Path of the backing store file
    pub fn store_path(&self) -> &Path {
        self.coordinator.path()
    }

    /// Report of the rescue that ran while building this environment, if any
    pub fn rescue_report(&self) -> Option<&RescueReport> {
        self.rescue_report.as_ref()
    }

    /// Runs `work` while holding the environment lock. Re-entrant: `work`
    /// may call back into this environment.
    pub fn with_lock<T, F>(&self, work: F) -> T
    where
        F: FnOnce(&LockedEnvironment<'_>) -> T,
    {
        let locked = LockedEnvironment {
            env: self,
            context: self.context.lock(),
        };
        work(&locked)
    }

    /// Adds a new object of `entity`
    pub fn insert(&self, entity: &str, fields: Fields) -> EnvResult<Record> {
        self.with_lock(|locked| locked.insert(entity, fields))
    }

    /// Merges `fields` into an existing object
    pub fn update(&self, id: &ObjectId, fields: Fields) -> EnvResult<Record> {
        self.with_lock(|locked| locked.update(id, fields))
    }

    /// Schedules an object for removal
    pub fn delete(&self, id: &ObjectId) -> EnvResult<()> {
        self.with_lock(|locked| locked.delete(id))
    }

    /// Current view of an object, pending changes included
    pub fn object(&self, id: &ObjectId) -> Option<Record> {
        self.with_lock(|locked| locked.object(id))
    }

    /// Runs a fetch against committed and pending objects
    pub fn fetch(&self, request: &FetchRequest) -> EnvResult<Vec<Record>> {
        self.with_lock(|locked| locked.fetch(request))
    }

    /// Number of objects a fetch would return
    pub fn count(&self, request: &FetchRequest) -> EnvResult<usize> {
        self.with_lock(|locked| locked.count(request))
    }

    /// Whether unsaved changes exist
    pub fn has_changes(&self) -> bool {
        self.with_lock(|locked| locked.has_changes())
    }

    /// Pending changes by kind
    pub fn pending_summary(&self) -> PendingSummary {
        self.with_lock(|locked| locked.pending_summary())
    }

    /// Discards unsaved changes
    pub fn rollback(&self) {
        self.with_lock(|locked| locked.rollback())
    }

    /// Flushes every pending change to the store as one unit. On failure
    /// nothing is written and the changes stay pending.
    pub fn save(&self) -> EnvResult<CommitReceipt> {
        self.with_lock(|locked| locked.save())
    }

    /// Returns `target`'s view of a saved object. Only the committed state
    /// counts on the source side, so pending changes here do not hide it. The
    /// source lock is released before the target lock is taken.
    pub fn copy_to(&self, id: &ObjectId, target: &PersistenceEnvironment) -> EnvResult<Record> {
        let saved = self.with_lock(|locked| locked.is_saved(id));
        if !saved {
            return Err(EnvError::invalid_operation(ContextError::ObjectNotFound(*id)));
        }

        target
            .object(id)
            .ok_or_else(|| EnvError::invalid_operation(ContextError::ObjectNotFound(*id)))
    }
}

impl Drop for PersistenceEnvironment {
    fn drop(&mut self) {
        let id = self.id.to_string();
        let path = self.coordinator.path().display().to_string();
        log_event_with_fields(
            Event::EnvironmentReleased,
            &[
                ("environment", &id),
                ("affinity", self.affinity.as_str()),
                ("path", &path),
            ],
        );
    }
}

impl fmt::Debug for PersistenceEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceEnvironment")
            .field("id", &self.id)
            .field("affinity", &self.affinity)
            .field("share_persistence", &self.share_persistence)
            .field("model", &self.model.tag())
            .field("store", &self.coordinator.path())
            .finish()
    }
}

/// An environment whose lock is held by the current thread.
pub struct LockedEnvironment<'a> {
    env: &'a PersistenceEnvironment,
    context: ReentrantMutexGuard<'a, RefCell<PersistenceContext>>,
}

impl LockedEnvironment<'_> {
    /// The environment the lock belongs to
    pub fn environment(&self) -> &PersistenceEnvironment {
        self.env
    }

    /// See [`PersistenceEnvironment::insert`]
    pub fn insert(&self, entity: &str, fields: Fields) -> EnvResult<Record> {
        self.context
            .borrow_mut()
            .insert(entity, fields)
            .map_err(EnvError::invalid_operation)
    }

    /// See [`PersistenceEnvironment::update`]
    pub fn update(&self, id: &ObjectId, fields: Fields) -> EnvResult<Record> {
        self.context
            .borrow_mut()
            .update(id, fields)
            .map_err(EnvError::invalid_operation)
    }

    /// See [`PersistenceEnvironment::delete`]
    pub fn delete(&self, id: &ObjectId) -> EnvResult<()> {
        self.context
            .borrow_mut()
            .delete(id)
            .map_err(EnvError::invalid_operation)
    }

    /// See [`PersistenceEnvironment::object`]
    pub fn object(&self, id: &ObjectId) -> Option<Record> {
        self.context.borrow().object(id)
    }

    /// Whether the object has been committed to the store
    pub fn is_saved(&self, id: &ObjectId) -> bool {
        self.env.coordinator.get(id).is_some()
    }

    /// See [`PersistenceEnvironment::fetch`]
    pub fn fetch(&self, request: &FetchRequest) -> EnvResult<Vec<Record>> {
        self.context
            .borrow()
            .fetch(request)
            .map_err(EnvError::invalid_operation)
    }

    /// See [`PersistenceEnvironment::count`]
    pub fn count(&self, request: &FetchRequest) -> EnvResult<usize> {
        self.context
            .borrow()
            .count(request)
            .map_err(EnvError::invalid_operation)
    }

    /// See [`PersistenceEnvironment::has_changes`]
    pub fn has_changes(&self) -> bool {
        self.context.borrow().has_changes()
    }

    /// See [`PersistenceEnvironment::pending_summary`]
    pub fn pending_summary(&self) -> PendingSummary {
        self.context.borrow().pending_summary()
    }

    /// See [`PersistenceEnvironment::rollback`]
    pub fn rollback(&self) {
        self.context.borrow_mut().rollback()
    }

    /// See [`PersistenceEnvironment::save`]
    pub fn save(&self) -> EnvResult<CommitReceipt> {
        let env_id = self.env.id.to_string();
        let scope = ObservationScope::with_fields("SAVE", &[("environment", &env_id)]);

        let result = self.context.borrow_mut().commit();
        match result {
            Ok(receipt) => {
                self.env
                    .metrics
                    .record_save_committed(receipt.changes_applied as u64);
                scope.complete_with_fields(&[
                    ("changes", &receipt.changes_applied.to_string()),
                    ("sequence", &receipt.sequence.to_string()),
                ]);
                Ok(receipt)
            }
            Err(e) => {
                self.env.metrics.increment_saves_failed();
                scope.fail(&e.to_string());
                Err(EnvError::save_failed(e))
            }
        }
    }
}
