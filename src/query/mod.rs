//! Queries
//!
//! Typed filters and sort keys, fetch requests built from them, and a
//! per-entity convenience layer that runs them through an environment.
//!
//! # Execution order
//!
//! 1. entity selection
//! 2. filter (no type coercion; a missing or null field never compares)
//! 3. stable multi-key sort
//! 4. offset, then limit

mod ast;
mod entity;
mod fetch;
mod filter;
mod sorter;

pub use ast::{CompareOp, Filter, SortDirection, SortSpec};
pub use entity::EntityQuery;
pub use fetch::FetchRequest;
pub use filter::FilterEvaluator;
pub use sorter::RecordSorter;
