//! Record validation against a model
//!
//! Rules:
//! - the entity must exist
//! - every required field is present and non-null
//! - no undeclared fields
//! - types match exactly, except that `float` accepts integers
//! - optional fields may be null

use serde_json::Value;

use super::errors::{ModelError, ModelResult};
use super::types::{FieldType, Model};
use crate::store::Record;

/// Validates records against a model. Never mutates the record.
pub struct RecordValidator<'a> {
    model: &'a Model,
}

impl<'a> RecordValidator<'a> {
    /// Creates a validator for `model`
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    /// Fails when the model does not declare `entity`
    pub fn check_entity(&self, entity: &str) -> ModelResult<()> {
        if self.model.entity(entity).is_none() {
            return Err(ModelError::UnknownEntity {
                model: self.model.name.clone(),
                entity: entity.to_string(),
            });
        }
        Ok(())
    }

    /// Validates a full record
    pub fn validate(&self, record: &Record) -> ModelResult<()> {
        let entity = self.model.entity(&record.entity).ok_or_else(|| {
            ModelError::UnknownEntity {
                model: self.model.name.clone(),
                entity: record.entity.clone(),
            }
        })?;

        for name in record.fields.keys() {
            if !entity.fields.contains_key(name) {
                return Err(ModelError::undeclared_field(&record.entity, name));
            }
        }

        for (name, def) in &entity.fields {
            match record.fields.get(name) {
                None | Some(Value::Null) if def.required => {
                    return Err(ModelError::missing_field(&record.entity, name));
                }
                None | Some(Value::Null) => {}
                Some(value) => {
                    if !matches_type(value, def.field_type) {
                        return Err(ModelError::type_mismatch(
                            &record.entity,
                            name,
                            def.field_type.type_name(),
                            json_type_name(value),
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

fn matches_type(value: &Value, field_type: FieldType) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Int => value.is_i64(),
        FieldType::Float => value.is_number(),
        FieldType::Bool => value.is_boolean(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{EntityDef, FieldDef};
    use crate::store::Fields;
    use serde_json::json;

    fn model() -> Model {
        Model::new("People", "1").with_entity(
            "Person",
            EntityDef::default()
                .with_field("name", FieldDef::required(FieldType::String))
                .with_field("age", FieldDef::optional(FieldType::Int))
                .with_field("score", FieldDef::optional(FieldType::Float)),
        )
    }

    fn person(pairs: &[(&str, Value)]) -> Record {
        let fields: Fields = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Record::new("Person", fields)
    }

    #[test]
    fn test_valid_record() {
        let model = model();
        let validator = RecordValidator::new(&model);
        let record = person(&[("name", json!("A")), ("age", json!(30))]);
        assert!(validator.validate(&record).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let model = model();
        let validator = RecordValidator::new(&model);
        let err = validator.validate(&person(&[("age", json!(30))])).unwrap_err();
        assert!(err.to_string().contains("'name'"));
    }

    #[test]
    fn test_null_required_is_missing() {
        let model = model();
        let validator = RecordValidator::new(&model);
        assert!(validator.validate(&person(&[("name", Value::Null)])).is_err());
    }

    #[test]
    fn test_null_optional_allowed() {
        let model = model();
        let validator = RecordValidator::new(&model);
        let record = person(&[("name", json!("A")), ("age", Value::Null)]);
        assert!(validator.validate(&record).is_ok());
    }

    #[test]
    fn test_no_type_coercion() {
        let model = model();
        let validator = RecordValidator::new(&model);
        let record = person(&[("name", json!("A")), ("age", json!("30"))]);
        let err = validator.validate(&record).unwrap_err();
        assert!(err.to_string().contains("expected int, got string"));
    }

    #[test]
    fn test_float_accepts_integers() {
        let model = model();
        let validator = RecordValidator::new(&model);
        let record = person(&[("name", json!("A")), ("score", json!(7))]);
        assert!(validator.validate(&record).is_ok());
    }

    #[test]
    fn test_undeclared_field() {
        let model = model();
        let validator = RecordValidator::new(&model);
        let record = person(&[("name", json!("A")), ("nickname", json!("a"))]);
        assert!(matches!(
            validator.validate(&record),
            Err(ModelError::Validation { .. })
        ));
    }

    #[test]
    fn test_unknown_entity() {
        let model = model();
        let validator = RecordValidator::new(&model);
        assert!(matches!(
            validator.check_entity("Pet"),
            Err(ModelError::UnknownEntity { .. })
        ));
    }
}
