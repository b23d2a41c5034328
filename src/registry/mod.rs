//! Environment registry
//!
//! Entry point for obtaining persistence environments: the main singleton,
//! capped background instances, and explicitly owned environments.

mod environments;
mod instances;

pub use environments::{EnvironmentDefaults, EnvironmentRegistry};
pub use instances::{InstanceLimiter, InstanceSlot};
