//! Execution errors

use std::io;

use thiserror::Error;

/// Result type for queue operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Failures of the serial background queue
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The worker thread could not be started
    #[error("Failed to start queue '{label}': {source}")]
    SpawnFailed {
        /// Queue label
        label: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The queue no longer accepts work
    #[error("Queue '{0}' is closed")]
    QueueClosed(String),

    /// A job panicked before producing its result
    #[error("Job on queue '{0}' panicked")]
    JobPanicked(String),
}
