//! Convenience layer over one entity
//!
//! Every call takes the environment to work in and goes through its lock.
//! Nothing here saves implicitly; call [`EntityQuery::save`] or
//! [`PersistenceEnvironment::save`].
//!
//! ```ignore
//! let people = EntityQuery::new("Person");
//! people.insert_item_with(&env, |p| {
//!     p.insert("name".into(), json!("A"));
//!     p.insert("age".into(), json!(30));
//! })?;
//! people.save(&env)?;
//! let adults = people.items_matching(&env, Filter::gte("age", json!(18)))?;
//! ```

use super::ast::{Filter, SortSpec};
use super::fetch::FetchRequest;
use crate::context::ContextError;
use crate::env::{EnvError, EnvResult, PersistenceEnvironment};
use crate::store::{CommitReceipt, Fields, ObjectId, Record};

/// Typed entry point for one entity of the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityQuery {
    entity: String,
}

impl EntityQuery {
    /// Queries over `entity`
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
        }
    }

    /// Entity name
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Fetch request over this entity, for further refinement
    pub fn request(&self) -> FetchRequest {
        FetchRequest::all(self.entity.clone())
    }

    /// Inserts an object with `fields`
    pub fn insert_item(&self, env: &PersistenceEnvironment, fields: Fields) -> EnvResult<Record> {
        env.insert(&self.entity, fields)
    }

    /// Inserts an object whose fields are filled in by `fill`
    pub fn insert_item_with<F>(&self, env: &PersistenceEnvironment, fill: F) -> EnvResult<Record>
    where
        F: FnOnce(&mut Fields),
    {
        let mut fields = Fields::new();
        fill(&mut fields);
        env.insert(&self.entity, fields)
    }

    /// Every object, in insertion order
    pub fn items(&self, env: &PersistenceEnvironment) -> EnvResult<Vec<Record>> {
        env.fetch(&self.request())
    }

    /// Objects matching `filter`
    pub fn items_matching(
        &self,
        env: &PersistenceEnvironment,
        filter: Filter,
    ) -> EnvResult<Vec<Record>> {
        env.fetch(&self.request().with_filter(filter))
    }

    /// Objects matching `filter` (or all), ordered by `sort`
    pub fn items_sorted(
        &self,
        env: &PersistenceEnvironment,
        filter: Option<Filter>,
        sort: &[SortSpec],
    ) -> EnvResult<Vec<Record>> {
        env.fetch(&self.refine(filter, sort))
    }

    /// One page of [`items_sorted`](Self::items_sorted)
    pub fn items_page(
        &self,
        env: &PersistenceEnvironment,
        filter: Option<Filter>,
        sort: &[SortSpec],
        offset: usize,
        limit: usize,
    ) -> EnvResult<Vec<Record>> {
        env.fetch(&self.refine(filter, sort).offset(offset).limit(limit))
    }

    /// Most recently inserted object
    pub fn last_item(&self, env: &PersistenceEnvironment) -> EnvResult<Option<Record>> {
        Ok(self.items(env)?.pop())
    }

    /// Most recently inserted object matching `filter`
    pub fn last_item_matching(
        &self,
        env: &PersistenceEnvironment,
        filter: Filter,
    ) -> EnvResult<Option<Record>> {
        Ok(self.items_matching(env, filter)?.pop())
    }

    /// Number of objects matching `filter`, or of all objects
    pub fn count(&self, env: &PersistenceEnvironment, filter: Option<Filter>) -> EnvResult<usize> {
        env.count(&self.refine(filter, &[]))
    }

    /// Schedules an object of this entity for removal. Objects of other
    /// entities are refused.
    pub fn remove(&self, env: &PersistenceEnvironment, id: &ObjectId) -> EnvResult<()> {
        env.with_lock(|locked| match locked.object(id) {
            Some(record) if record.entity != self.entity => {
                Err(EnvError::invalid_operation(ContextError::EntityMismatch {
                    id: *id,
                    expected: self.entity.clone(),
                    found: record.entity,
                }))
            }
            _ => locked.delete(id),
        })
    }

    /// Schedules every object matching `filter` for removal, under one lock
    pub fn remove_matching(&self, env: &PersistenceEnvironment, filter: Filter) -> EnvResult<usize> {
        let request = self.request().with_filter(filter);
        env.with_lock(|locked| {
            let doomed = locked.fetch(&request)?;
            for record in &doomed {
                locked.delete(&record.id)?;
            }
            Ok(doomed.len())
        })
    }

    /// Flushes the environment's pending changes
    pub fn save(&self, env: &PersistenceEnvironment) -> EnvResult<CommitReceipt> {
        env.save()
    }

    fn refine(&self, filter: Option<Filter>, sort: &[SortSpec]) -> FetchRequest {
        let mut request = self.request();
        request.filter = filter;
        request.sort = sort.to_vec();
        request
    }
}
