//! Record identity and values
//!
//! Records are flat maps of scalar field values tagged with the entity they
//! belong to. Field order is kept sorted so encoding is deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Field name to scalar value
pub type Fields = BTreeMap<String, Value>;

/// Stable identity of a record across contexts and store reopenings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generates a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses the hyphenated string form
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Returns the underlying uuid
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identity
    pub id: ObjectId,
    /// Entity name as declared in the model
    pub entity: String,
    /// Field values
    pub fields: Fields,
}

impl Record {
    /// Creates a record with a fresh id
    pub fn new(entity: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: ObjectId::new(),
            entity: entity.into(),
            fields,
        }
    }

    /// Returns a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field value, returning the previous one
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    /// Merges `changes` over the current fields
    pub fn merge(&mut self, changes: Fields) {
        self.fields.extend(changes);
    }
}
