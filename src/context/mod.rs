//! Persistence contexts
//!
//! A context is the unit of work of one environment: it accumulates inserts,
//! updates and deletes in memory and commits them to its store coordinator in
//! one frame. It does no locking of its own.

mod errors;
mod pending;
mod persistence;

pub use errors::{ContextError, ContextResult};
pub use pending::{PendingChange, PendingSummary};
pub use persistence::PersistenceContext;
