//! Execution contexts
//!
//! Environments are tagged with the logical context they serve. Background
//! work runs on a dedicated serial queue, so every job on it shares one
//! owner thread for the purposes of environment locking.

mod affinity;
mod errors;
mod queue;

pub use affinity::Affinity;
pub use errors::{ExecutionError, ExecutionResult};
pub use queue::SerialQueue;
