//! CLI module for nestdb
//!
//! Provides command-line interface for:
//! - init: Create the store directory and a starter model
//! - insert: Insert one object and save
//! - list: Print the objects of an entity
//! - remove: Remove one object and save
//! - verify: Open the store under the configured rescue policy

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{init, insert, list, remove, run, run_command, verify};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_request, write_error, write_response};
