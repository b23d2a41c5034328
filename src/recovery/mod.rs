//! Store recovery
//!
//! When a store cannot be opened (I/O failure, corruption, or a header naming
//! another model) environment construction hands the failure to the
//! [`RecoveryCoordinator`]. It consults the registered [`RescuePolicy`] and
//! either gives up or discards the file and starts over with a blank store,
//! exactly once.

mod policy;
mod rescue;

pub use policy::{RescueContext, RescuePolicy};
pub use rescue::{RecoveryCoordinator, RescueReport, RescueState};
