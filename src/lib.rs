//! nestdb - managed persistence environments over a local object store
//!
//! An [`EnvironmentRegistry`](registry::EnvironmentRegistry) hands out
//! environments: a main singleton, capped background instances and
//! explicitly owned ones. Each environment binds a model, a store coordinator
//! (pooled or private) and a unit of work behind a recursive lock. A store
//! that fails to open goes through a one-shot rescue protocol.

pub mod cli;
pub mod config;
pub mod context;
pub mod env;
pub mod execution;
pub mod model;
pub mod observability;
pub mod query;
pub mod recovery;
pub mod registry;
pub mod store;
