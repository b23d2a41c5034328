//! CLI command implementations
//!
//! Every command loads the configuration, builds a registry and works through
//! its main environment. Mutating commands save before they report success.

use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use crate::config::EnvConfig;
use crate::env::PersistenceEnvironment;
use crate::model::{EntityDef, FieldDef, FieldType, Model, ModelCatalog};
use crate::observability::{Logger, Severity};
use crate::query::FetchRequest;
use crate::registry::EnvironmentRegistry;
use crate::store::{Fields, ObjectId};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_response};

/// Main CLI entry point
///
/// Parses arguments, sets the log threshold and dispatches.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    Logger::set_min_severity(if cli.verbose {
        Severity::Trace
    } else {
        Severity::Warn
    });
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Insert { config, entity } => insert(&config, &entity),
        Command::List {
            config,
            entity,
            limit,
        } => list(&config, &entity, limit),
        Command::Remove { config, id } => remove(&config, &id),
        Command::Verify { config } => verify(&config),
    }
}

/// Creates the store directory and writes a starter model
pub fn init(config_path: &Path) -> CliResult<()> {
    let config = EnvConfig::load(config_path)?;
    write_response(init_with(&config)?)
}

/// Inserts the JSON object on stdin into `entity`
pub fn insert(config_path: &Path, entity: &str) -> CliResult<()> {
    let config = EnvConfig::load(config_path)?;
    let request = read_request()?;
    write_response(insert_with(&config, entity, request)?)
}

/// Lists the objects of `entity`
pub fn list(config_path: &Path, entity: &str, limit: Option<usize>) -> CliResult<()> {
    let config = EnvConfig::load(config_path)?;
    write_response(list_with(&config, entity, limit)?)
}

/// Removes one object
pub fn remove(config_path: &Path, id: &str) -> CliResult<()> {
    let config = EnvConfig::load(config_path)?;
    write_response(remove_with(&config, id)?)
}

/// Opens the store and reports its state
pub fn verify(config_path: &Path) -> CliResult<()> {
    let config = EnvConfig::load(config_path)?;
    write_response(verify_with(&config)?)
}

fn starter_model(name: &str) -> Model {
    let mut model = Model::new(name, "1").with_entity(
        "Person",
        EntityDef::default()
            .with_field("name", FieldDef::required(FieldType::String))
            .with_field("age", FieldDef::optional(FieldType::Int)),
    );
    model.description = Some("Starter model written by nestdb init".into());
    model
}

fn init_with(config: &EnvConfig) -> CliResult<Value> {
    let catalog = ModelCatalog::new(config.model_dir.clone());
    if catalog.definition_path(&config.model_name).exists() {
        return Err(CliError::already_initialized(&config.model_name));
    }

    fs::create_dir_all(&config.root_path).map_err(|e| {
        CliError::config_error(format!(
            "Failed to create directory {}: {}",
            config.root_path.display(),
            e
        ))
    })?;

    let model_path = catalog
        .save_definition(&starter_model(&config.model_name))
        .map_err(|e| CliError::config_error(e.to_string()))?;

    Ok(json!({
        "initialized": true,
        "model": model_path.display().to_string(),
        "root_path": config.root_path.display().to_string(),
    }))
}

fn with_main_environment<T>(
    config: &EnvConfig,
    work: impl FnOnce(&EnvironmentRegistry, &PersistenceEnvironment) -> CliResult<T>,
) -> CliResult<T> {
    let registry = EnvironmentRegistry::new(config);
    let env = registry.main_environment()?;
    work(&registry, &env)
}

fn insert_with(config: &EnvConfig, entity: &str, request: Value) -> CliResult<Value> {
    let fields: Fields = match request {
        Value::Object(map) => map.into_iter().collect(),
        _ => return Err(CliError::invalid_input("Expected a JSON object of fields")),
    };

    with_main_environment(config, |_, env| {
        let record = env.insert(entity, fields)?;
        let receipt = env.save()?;
        Ok(json!({
            "object": record,
            "sequence": receipt.sequence,
        }))
    })
}

fn list_with(config: &EnvConfig, entity: &str, limit: Option<usize>) -> CliResult<Value> {
    let mut request = FetchRequest::all(entity);
    request.limit = limit;

    with_main_environment(config, |_, env| {
        let objects = env.fetch(&request)?;
        Ok(json!({
            "entity": entity,
            "count": objects.len(),
            "objects": objects,
        }))
    })
}

fn remove_with(config: &EnvConfig, id: &str) -> CliResult<Value> {
    let id = ObjectId::parse(id)
        .ok_or_else(|| CliError::invalid_input(format!("Invalid object id: {}", id)))?;

    with_main_environment(config, |_, env| {
        env.delete(&id)?;
        let receipt = env.save()?;
        Ok(json!({
            "removed": id.to_string(),
            "sequence": receipt.sequence,
        }))
    })
}

fn verify_with(config: &EnvConfig) -> CliResult<Value> {
    with_main_environment(config, |registry, env| {
        let mut objects = serde_json::Map::new();
        for entity in env.model().entities.keys() {
            let count = env.count(&FetchRequest::all(entity.clone()))?;
            objects.insert(entity.clone(), json!(count));
        }

        Ok(json!({
            "path": env.store_path().display().to_string(),
            "model": env.model().tag(),
            "last_sequence": env.coordinator().last_sequence(),
            "objects": objects,
            "rescue": env.rescue_report(),
            "metrics": registry.metrics(),
        }))
    })
}
