//! CLI argument definitions using clap
//!
//! Commands:
//! - nestdb init --config <path>
//! - nestdb insert --config <path> --entity <name>   (fields as JSON on stdin)
//! - nestdb list --config <path> --entity <name> [--limit <n>]
//! - nestdb remove --config <path> --id <uuid>
//! - nestdb verify --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// nestdb - managed environments over a local object store
#[derive(Parser, Debug)]
#[command(name = "nestdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log every lifecycle event, not just warnings and errors
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the store directory and a starter model definition
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./nestdb.json")]
        config: PathBuf,
    },

    /// Insert one object read as a JSON object from stdin, then save
    Insert {
        /// Path to configuration file
        #[arg(long, default_value = "./nestdb.json")]
        config: PathBuf,

        /// Entity of the new object
        #[arg(long)]
        entity: String,
    },

    /// Print the objects of an entity
    List {
        /// Path to configuration file
        #[arg(long, default_value = "./nestdb.json")]
        config: PathBuf,

        /// Entity to list
        #[arg(long)]
        entity: String,

        /// Maximum number of objects
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Remove one object by id, then save
    Remove {
        /// Path to configuration file
        #[arg(long, default_value = "./nestdb.json")]
        config: PathBuf,

        /// Object id
        #[arg(long)]
        id: String,
    },

    /// Open the store, running the configured rescue policy, and report on it
    Verify {
        /// Path to configuration file
        #[arg(long, default_value = "./nestdb.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
