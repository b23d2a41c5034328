//! Store error types
//!
//! Error codes:
//! - NEST_STORE_IO_ERROR (ERROR)
//! - NEST_STORE_WRITE_FAILED (ERROR)
//! - NEST_STORE_CORRUPTION (FATAL for the store file, triggers rescue)
//! - NEST_STORE_MODEL_MISMATCH (ERROR, triggers rescue)
//! - NEST_STORE_CONFLICT (ERROR, commit made against a stale object)

use std::fmt;
use std::io;

use super::object::ObjectId;

/// Severity levels shared by every nestdb error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation fails, the process carries on
    Error,
    /// The resource is unusable and the caller must not continue with it
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Store error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Filesystem failure while opening or reading
    NestStoreIoError,
    /// A commit frame could not be made durable
    NestStoreWriteFailed,
    /// Header or frame failed validation
    NestStoreCorruption,
    /// The file was written for a different model
    NestStoreModelMismatch,
    /// An object changed or vanished since the committing context read it
    NestStoreConflict,
}

impl StoreErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::NestStoreIoError => "NEST_STORE_IO_ERROR",
            StoreErrorCode::NestStoreWriteFailed => "NEST_STORE_WRITE_FAILED",
            StoreErrorCode::NestStoreCorruption => "NEST_STORE_CORRUPTION",
            StoreErrorCode::NestStoreModelMismatch => "NEST_STORE_MODEL_MISMATCH",
            StoreErrorCode::NestStoreConflict => "NEST_STORE_CONFLICT",
        }
    }

    /// Returns the severity for this code
    pub fn severity(&self) -> Severity {
        match self {
            StoreErrorCode::NestStoreCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Store error with context
#[derive(Debug)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StoreError {
    /// I/O failure while opening, creating or reading the store
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StoreErrorCode::NestStoreIoError,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// A commit could not be written or synced
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StoreErrorCode::NestStoreWriteFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// A commit was rejected before touching the file
    pub fn write_rejected(message: impl Into<String>) -> Self {
        Self {
            code: StoreErrorCode::NestStoreWriteFailed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Header or frame corruption
    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: StoreErrorCode::NestStoreCorruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Corruption located at a byte offset
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: StoreErrorCode::NestStoreCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// The file header names a different model or model version
    pub fn model_mismatch(expected: &str, found: &str) -> Self {
        Self {
            code: StoreErrorCode::NestStoreModelMismatch,
            message: "Store file was written for a different model".into(),
            details: Some(format!("expected: {}, found: {}", expected, found)),
            source: None,
        }
    }

    /// A change was made against a revision the store no longer holds
    pub fn conflict(id: &ObjectId, expected: u64, found: Option<u64>) -> Self {
        let found = match found {
            Some(revision) => revision.to_string(),
            None => "deleted".to_string(),
        };
        Self {
            code: StoreErrorCode::NestStoreConflict,
            message: format!("Object {} was changed by another commit", id),
            details: Some(format!("expected_revision: {}, found: {}", expected, found)),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    /// Returns the severity
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the details, if any
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether the store file is unusable as-is
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
