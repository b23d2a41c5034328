//! Environment configuration
//!
//! JSON file, every field optional:
//!
//! ```json
//! {
//!   "root_path": "./data",
//!   "database_name": "nestdb.db",
//!   "model_name": "Model",
//!   "model_dir": "./models",
//!   "max_background_instances": 8,
//!   "rescue_on_failure": false,
//!   "abort_on_rescue_failure": false
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event};
use crate::recovery::RescuePolicy;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for [`EnvConfig`]
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("Invalid config value '{field}': {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Settings shared by every environment of a registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Directory containing store files
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Default store file name
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// Default model name
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Directory containing `<model>.json` definitions
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Cap on outstanding background environments
    #[serde(default = "default_max_background_instances")]
    pub max_background_instances: usize,

    /// Discard and recreate a store that fails to open
    #[serde(default)]
    pub rescue_on_failure: bool,

    /// Treat a failed rescue as FATAL
    #[serde(default)]
    pub abort_on_rescue_failure: bool,
}

fn default_root_path() -> PathBuf {
    PathBuf::from("./data")
}
fn default_database_name() -> String {
    "nestdb.db".to_string()
}
fn default_model_name() -> String {
    "Model".to_string()
}
fn default_model_dir() -> PathBuf {
    PathBuf::from("./models")
}
fn default_max_background_instances() -> usize {
    8
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            database_name: default_database_name(),
            model_name: default_model_name(),
            model_dir: default_model_dir(),
            max_background_instances: default_max_background_instances(),
            rescue_on_failure: false,
            abort_on_rescue_failure: false,
        }
    }
}

impl EnvConfig {
    /// Loads and validates a configuration file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: EnvConfig = serde_json::from_str(&content)?;
        config.validate()?;

        log_event_with_fields(
            Event::ConfigLoaded,
            &[("path", &path.display().to_string())],
        );
        Ok(config)
    }

    /// Config rooted at `dir`: stores in `dir/data`, models in `dir/models`
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            root_path: dir.join("data"),
            model_dir: dir.join("models"),
            ..Self::default()
        }
    }

    /// Checks value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "database_name",
                reason: "must not be empty".into(),
            });
        }

        if self.database_name.contains(|c: char| c == '/' || c == '\\') {
            return Err(ConfigError::Invalid {
                field: "database_name",
                reason: "must be a file name, not a path".into(),
            });
        }

        if self.model_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model_name",
                reason: "must not be empty".into(),
            });
        }

        if self.max_background_instances == 0 {
            return Err(ConfigError::Invalid {
                field: "max_background_instances",
                reason: "must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Rescue policy described by the rescue flags
    pub fn rescue_policy(&self) -> RescuePolicy {
        let policy = if self.rescue_on_failure {
            RescuePolicy::always()
        } else {
            RescuePolicy::never()
        };
        policy.abort_on_rescue_failure(self.abort_on_rescue_failure)
    }
}
