//! Model subsystem
//!
//! A model is the immutable schema an environment works against: a named,
//! versioned set of entities with scalar fields. The catalog resolves model
//! names to shared handles once per process; the validator checks records
//! against their entity before they are committed.

mod catalog;
mod errors;
mod types;
mod validator;

pub use catalog::ModelCatalog;
pub use errors::{ModelError, ModelResult};
pub use types::{EntityDef, FieldDef, FieldType, Model};
pub use validator::RecordValidator;
