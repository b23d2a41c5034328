//! Model catalog and record validation errors

use std::path::PathBuf;

use thiserror::Error;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while resolving models or validating records against them
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    // ==================
    // Catalog Errors
    // ==================
    /// No definition file for the requested model
    #[error("Model '{name}' not found at {}", path.display())]
    NotFound {
        /// Requested model name
        name: String,
        /// Path that was looked up
        path: PathBuf,
    },

    /// The definition file exists but cannot be used
    #[error("Malformed model '{name}': {reason}")]
    Malformed {
        /// Model name or file
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// A model with this name is already resolved
    #[error("Model '{0}' is already registered and immutable")]
    AlreadyRegistered(String),

    // ==================
    // Record Errors
    // ==================
    /// The model declares no such entity
    #[error("Model '{model}' has no entity '{entity}'")]
    UnknownEntity {
        /// Model name
        model: String,
        /// Requested entity
        entity: String,
    },

    /// A record does not satisfy its entity definition
    #[error("Invalid {entity} record, field '{field}': expected {expected}, got {actual}")]
    Validation {
        /// Entity name
        entity: String,
        /// Offending field
        field: String,
        /// Expected type or condition
        expected: String,
        /// What was found
        actual: String,
    },
}

impl ModelError {
    /// Missing required field
    pub fn missing_field(entity: &str, field: &str) -> Self {
        Self::Validation {
            entity: entity.into(),
            field: field.into(),
            expected: "field to be present".into(),
            actual: "missing".into(),
        }
    }

    /// Field not declared by the entity
    pub fn undeclared_field(entity: &str, field: &str) -> Self {
        Self::Validation {
            entity: entity.into(),
            field: field.into(),
            expected: "no undeclared fields".into(),
            actual: "extra field present".into(),
        }
    }

    /// Wrong scalar type
    pub fn type_mismatch(entity: &str, field: &str, expected: &str, actual: &str) -> Self {
        Self::Validation {
            entity: entity.into(),
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message() {
        let err = ModelError::type_mismatch("Person", "age", "int", "string");
        assert_eq!(
            err.to_string(),
            "Invalid Person record, field 'age': expected int, got string"
        );
    }

    #[test]
    fn test_not_found_mentions_path() {
        let err = ModelError::NotFound {
            name: "M".into(),
            path: PathBuf::from("/models/M.json"),
        };
        assert!(err.to_string().contains("/models/M.json"));
    }
}
