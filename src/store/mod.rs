//! Store subsystem for nestdb
//!
//! A store is a single append-only file per database:
//! a header naming the model it was created with, followed by one checksummed
//! commit frame per successful save. Coordinators own the files; the pool
//! decides which coordinators are shared between environments.
//!
//! # Guarantees
//!
//! - A save is one frame: it is either fully durable or absent
//! - Every header and frame is checksum-verified when a store is opened
//! - Any corruption, truncation or model mismatch fails the open
//! - At most one live coordinator owns a given file

mod checksum;
mod coordinator;
mod errors;
mod frame;
mod object;
mod pool;
mod reader;
mod writer;

pub use checksum::{compute_checksum, verify_checksum};
pub use coordinator::{
    BaseRevision, CommitReceipt, CoordinatorFactory, FileCoordinatorFactory, FileStoreCoordinator,
    StoreCoordinator, StoreLocation,
};
pub use errors::{Severity, StoreError, StoreErrorCode, StoreResult};
pub use frame::{Change, CommitFrame, StoreHeader, FORMAT_VERSION, STORE_MAGIC};
pub use object::{Fields, ObjectId, Record};
pub use pool::{CoordinatorPool, SharedCoordinator};
pub use reader::StoreReader;
pub use writer::StoreWriter;
