//! Model catalog
//!
//! Resolves a model name to an immutable, shared model handle:
//! - definitions live at `<model_dir>/<name>.json`
//! - a name is resolved at most once; later lookups return the cached handle
//! - resolved models are never replaced

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::errors::{ModelError, ModelResult};
use super::types::Model;
use crate::observability::{log_event_with_fields, Event};

const MODEL_EXTENSION: &str = "json";

/// Name-to-model lookup with a resolve-once cache.
#[derive(Debug)]
pub struct ModelCatalog {
    model_dir: PathBuf,
    models: RwLock<HashMap<String, Arc<Model>>>,
}

impl ModelCatalog {
    /// Creates a catalog reading definitions from `model_dir`
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the definition directory
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Path looked up for `name`. A trailing `.json` in the name is tolerated.
    pub fn definition_path(&self, name: &str) -> PathBuf {
        self.model_dir
            .join(format!("{}.{}", Self::stem(name), MODEL_EXTENSION))
    }

    fn stem(name: &str) -> &str {
        name.strip_suffix(".json").unwrap_or(name)
    }

    /// Resolves `name`, loading its definition on first use.
    pub fn resolve(&self, name: &str) -> ModelResult<Arc<Model>> {
        let name = Self::stem(name);
        if let Some(model) = self.models.read().get(name) {
            return Ok(Arc::clone(model));
        }

        let mut models = self.models.write();
        // Another caller may have loaded it while we waited for the write lock
        if let Some(model) = models.get(name) {
            return Ok(Arc::clone(model));
        }

        let model = Arc::new(self.load(name)?);
        log_event_with_fields(
            Event::ModelResolved,
            &[("model", name), ("version", &model.version)],
        );
        models.insert(name.to_string(), Arc::clone(&model));
        Ok(model)
    }

    /// Registers an in-memory model under its own name.
    pub fn register(&self, model: Model) -> ModelResult<Arc<Model>> {
        model.validate_structure().map_err(|reason| ModelError::Malformed {
            name: model.name.clone(),
            reason,
        })?;

        let mut models = self.models.write();
        if models.contains_key(&model.name) {
            return Err(ModelError::AlreadyRegistered(model.name));
        }

        let model = Arc::new(model);
        models.insert(model.name.clone(), Arc::clone(&model));
        Ok(model)
    }

    /// Returns whether `name` has already been resolved
    pub fn is_resolved(&self, name: &str) -> bool {
        self.models.read().contains_key(Self::stem(name))
    }

    /// Number of resolved models
    pub fn resolved_count(&self) -> usize {
        self.models.read().len()
    }

    /// Writes a definition file for `model`. Existing files are never overwritten.
    pub fn save_definition(&self, model: &Model) -> ModelResult<PathBuf> {
        model.validate_structure().map_err(|reason| ModelError::Malformed {
            name: model.name.clone(),
            reason,
        })?;

        let path = self.definition_path(&model.name);
        if path.exists() {
            return Err(ModelError::AlreadyRegistered(model.name.clone()));
        }

        fs::create_dir_all(&self.model_dir).map_err(|e| ModelError::Malformed {
            name: model.name.clone(),
            reason: format!("Failed to create model directory: {}", e),
        })?;

        let content = serde_json::to_string_pretty(model).map_err(|e| ModelError::Malformed {
            name: model.name.clone(),
            reason: format!("Failed to serialize model: {}", e),
        })?;

        fs::write(&path, content).map_err(|e| ModelError::Malformed {
            name: model.name.clone(),
            reason: format!("Failed to write {}: {}", path.display(), e),
        })?;

        Ok(path)
    }

    fn load(&self, name: &str) -> ModelResult<Model> {
        let path = self.definition_path(name);

        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ModelError::NotFound {
                    name: name.to_string(),
                    path: path.clone(),
                }
            } else {
                ModelError::Malformed {
                    name: name.to_string(),
                    reason: format!("Failed to read {}: {}", path.display(), e),
                }
            }
        })?;

        let model: Model = serde_json::from_str(&content).map_err(|e| ModelError::Malformed {
            name: name.to_string(),
            reason: format!("Invalid JSON: {}", e),
        })?;

        model
            .validate_structure()
            .map_err(|reason| ModelError::Malformed {
                name: name.to_string(),
                reason,
            })?;

        Ok(model)
    }
}
