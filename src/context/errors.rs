//! Persistence context errors

use thiserror::Error;

use crate::model::ModelError;
use crate::store::{ObjectId, StoreError};

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;

/// Errors raised by a unit of work
#[derive(Debug, Error)]
pub enum ContextError {
    /// Unknown entity or a record failing validation
    #[error(transparent)]
    Model(#[from] ModelError),

    /// No committed or pending object with this id
    #[error("Object {0} not found")]
    ObjectNotFound(ObjectId),

    /// The object exists but belongs to another entity
    #[error("Object {id} is a {found}, not a {expected}")]
    EntityMismatch {
        /// Object addressed
        id: ObjectId,
        /// Entity the caller works with
        expected: String,
        /// Entity of the object
        found: String,
    },

    /// The coordinator refused or failed the commit
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ContextError {
    /// True when the caller supplied something the model or store does not know
    pub fn is_invalid_operation(&self) -> bool {
        matches!(
            self,
            ContextError::ObjectNotFound(_)
                | ContextError::EntityMismatch { .. }
                | ContextError::Model(ModelError::UnknownEntity { .. })
        )
    }
}
