//! Persistence environments
//!
//! An environment is the bound tuple of model, store coordinator, context and
//! recursive lock that callers read and write through. Environments are
//! usually obtained from an [`EnvironmentRegistry`](crate::registry::EnvironmentRegistry);
//! [`EnvironmentBuilder`] is the underlying factory.

mod builder;
mod environment;
mod errors;

pub use builder::{EnvironmentBuilder, EnvironmentServices};
pub use environment::{LockedEnvironment, PersistenceEnvironment};
pub use errors::{EnvError, EnvErrorCode, EnvResult};
