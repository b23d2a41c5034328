//! Model definition types
//!
//! A model names a set of entities; each entity declares scalar fields:
//! - string: UTF-8 string
//! - int: 64-bit signed integer
//! - float: 64-bit floating point (integers are accepted)
//! - bool: Boolean
//!
//! Definition files are JSON:
//!
//! ```json
//! {
//!   "name": "People",
//!   "version": "1",
//!   "entities": {
//!     "Person": {
//!       "fields": {
//!         "name": { "type": "string", "required": true },
//!         "age": { "type": "int" }
//!       }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scalar field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// Boolean
    Bool,
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
        }
    }
}

/// A single field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Scalar type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether a saved record must carry the field
    #[serde(default)]
    pub required: bool,
}

impl FieldDef {
    /// Required field of the given type
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
        }
    }

    /// Optional field of the given type
    pub fn optional(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
        }
    }
}

/// An entity: a fixed set of fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Field declarations by name
    pub fields: BTreeMap<String, FieldDef>,
}

impl EntityDef {
    /// Adds a field, builder style
    pub fn with_field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }
}

/// An immutable, named model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// Model name
    pub name: String,
    /// Model version; stores remember it and refuse to open under another
    pub version: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Entities by name
    pub entities: BTreeMap<String, EntityDef>,
}

impl Model {
    /// Creates an empty model
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            entities: BTreeMap::new(),
        }
    }

    /// Adds an entity, builder style
    pub fn with_entity(mut self, name: impl Into<String>, entity: EntityDef) -> Self {
        self.entities.insert(name.into(), entity);
        self
    }

    /// Looks up an entity
    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// `name@version`
    pub fn tag(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Checks the definition itself, not a record
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Model name must not be empty".into());
        }
        if self.version.trim().is_empty() {
            return Err("Model version must not be empty".into());
        }
        if self.entities.is_empty() {
            return Err("Model must declare at least one entity".into());
        }
        for (entity_name, entity) in &self.entities {
            if entity_name.trim().is_empty() {
                return Err("Entity names must not be empty".into());
            }
            if entity.fields.keys().any(|f| f.trim().is_empty()) {
                return Err(format!("Entity '{}' has an empty field name", entity_name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Model {
        Model::new("People", "1").with_entity(
            "Person",
            EntityDef::default()
                .with_field("name", FieldDef::required(FieldType::String))
                .with_field("age", FieldDef::optional(FieldType::Int)),
        )
    }

    #[test]
    fn test_structure_valid() {
        assert!(people().validate_structure().is_ok());
    }

    #[test]
    fn test_model_without_entities_rejected() {
        let err = Model::new("Empty", "1").validate_structure().unwrap_err();
        assert!(err.contains("at least one entity"));
    }

    #[test]
    fn test_parses_definition_file_shape() {
        let json = r#"{
            "name": "People",
            "version": "1",
            "entities": {
                "Person": {
                    "fields": {
                        "name": { "type": "string", "required": true },
                        "age": { "type": "int" }
                    }
                }
            }
        }"#;
        let model: Model = serde_json::from_str(json).unwrap();
        assert_eq!(model, people());
        assert_eq!(model.tag(), "People@1");
    }
}
