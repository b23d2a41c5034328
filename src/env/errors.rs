//! Environment error types
//!
//! Error codes:
//! - NEST_TOO_MANY_INSTANCES (ERROR)
//! - NEST_STORE_CREATION_FAILED (ERROR)
//! - NEST_RESCUE_FAILED (ERROR, or FATAL when the policy aborts on failure)
//! - NEST_SAVE_FAILED (ERROR)
//! - NEST_MODEL_UNAVAILABLE (ERROR)
//! - NEST_INVALID_OPERATION (ERROR)
//! - NEST_EXECUTION_FAILED (ERROR)

use std::error::Error;
use std::fmt;
use std::path::Path;

use crate::context::ContextError;
use crate::execution::ExecutionError;
use crate::model::ModelError;
use crate::store::{Severity, StoreError};

type BoxedSource = Box<dyn Error + Send + Sync + 'static>;

/// Environment error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvErrorCode {
    /// Background instance cap reached
    NestTooManyInstances,
    /// Store coordinator could not be created and no rescue ran
    NestStoreCreationFailed,
    /// The rescue protocol ran and failed
    NestRescueFailed,
    /// A save did not reach the store
    NestSaveFailed,
    /// The model could not be resolved
    NestModelUnavailable,
    /// Unknown entity or object
    NestInvalidOperation,
    /// Background execution failed
    NestExecutionFailed,
}

impl EnvErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            EnvErrorCode::NestTooManyInstances => "NEST_TOO_MANY_INSTANCES",
            EnvErrorCode::NestStoreCreationFailed => "NEST_STORE_CREATION_FAILED",
            EnvErrorCode::NestRescueFailed => "NEST_RESCUE_FAILED",
            EnvErrorCode::NestSaveFailed => "NEST_SAVE_FAILED",
            EnvErrorCode::NestModelUnavailable => "NEST_MODEL_UNAVAILABLE",
            EnvErrorCode::NestInvalidOperation => "NEST_INVALID_OPERATION",
            EnvErrorCode::NestExecutionFailed => "NEST_EXECUTION_FAILED",
        }
    }
}

impl fmt::Display for EnvErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Environment error with context
#[derive(Debug)]
pub struct EnvError {
    code: EnvErrorCode,
    severity: Severity,
    message: String,
    details: Option<String>,
    source: Option<BoxedSource>,
}

impl EnvError {
    fn new(code: EnvErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn with_source(mut self, source: impl Into<BoxedSource>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Background cap reached
    pub fn too_many_instances(cap: usize) -> Self {
        Self::new(
            EnvErrorCode::NestTooManyInstances,
            "Too many background environments outstanding",
        )
        .with_details(format!("max_background_instances: {}", cap))
    }

    /// Coordinator creation failed and was not rescued
    pub fn store_creation_failed(path: &Path, source: StoreError) -> Self {
        Self::new(
            EnvErrorCode::NestStoreCreationFailed,
            format!("Failed to open store: {}", source.message()),
        )
        .with_details(format!("path: {}", path.display()))
        .with_source(source)
    }

    /// The one rescue attempt failed
    pub fn rescue_failed(path: &Path, source: StoreError, fatal: bool) -> Self {
        let mut err = Self::new(
            EnvErrorCode::NestRescueFailed,
            format!("Failed to recreate store: {}", source.message()),
        )
        .with_details(format!("path: {}", path.display()))
        .with_source(source);
        if fatal {
            err.severity = Severity::Fatal;
        }
        err
    }

    /// Save rejected by validation or failed in the store
    pub fn save_failed(source: ContextError) -> Self {
        Self::new(EnvErrorCode::NestSaveFailed, format!("Save failed: {}", source))
            .with_source(source)
    }

    /// Model could not be resolved
    pub fn model_unavailable(source: ModelError) -> Self {
        Self::new(
            EnvErrorCode::NestModelUnavailable,
            format!("Model unavailable: {}", source),
        )
        .with_source(source)
    }

    /// Unknown entity or object
    pub fn invalid_operation(source: ContextError) -> Self {
        Self::new(EnvErrorCode::NestInvalidOperation, source.to_string()).with_source(source)
    }

    /// Operation not permitted in the current state
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(EnvErrorCode::NestInvalidOperation, message)
    }

    /// Background queue failure
    pub fn execution_failed(source: ExecutionError) -> Self {
        Self::new(EnvErrorCode::NestExecutionFailed, source.to_string()).with_source(source)
    }

    /// Returns the error code
    pub fn code(&self) -> EnvErrorCode {
        self.code
    }

    /// Returns the severity
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the details, if any
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether the caller should stop using the store
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code.code(), self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl Error for EnvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<ExecutionError> for EnvError {
    fn from(err: ExecutionError) -> Self {
        EnvError::execution_failed(err)
    }
}

/// Result type for environment operations
pub type EnvResult<T> = Result<T, EnvError>;
