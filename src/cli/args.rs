//! CLI argument definitions using clap
//!
//! Commands:
//! - schemaguard scan [--force]
//! - schemaguard watch
//! - schemaguard write --collection <c> [--record <id>]
//! - schemaguard ensure-option --collection <c> --field <f> --value <v>...
//! - schemaguard stub [--run <id>]
//! - schemaguard show <collection> [--live]
//! - schemaguard query --collection <c> [--filter <json>]
//! - schemaguard reset-guard
//!
//! Every command accepts `--config <path>`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// schemaguard - schema reconciliation and safe writes for a Notion workspace
#[derive(Parser, Debug)]
#[command(name = "schemaguard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compare every live schema against the declarations once
    Scan {
        /// Path to configuration file
        #[arg(long, default_value = "./schemaguard.json")]
        config: PathBuf,

        /// Ignore the run guard (already ran today, too many failures)
        #[arg(long)]
        force: bool,
    },

    /// Run scans on the configured cron schedule until interrupted
    Watch {
        /// Path to configuration file
        #[arg(long, default_value = "./schemaguard.json")]
        config: PathBuf,
    },

    /// Validate and write one record; fields are read as JSON from stdin
    Write {
        /// Path to configuration file
        #[arg(long, default_value = "./schemaguard.json")]
        config: PathBuf,

        #[arg(long)]
        collection: String,

        /// Update this record instead of creating one
        #[arg(long)]
        record: Option<String>,
    },

    /// Make values live options of an enum field
    EnsureOption {
        /// Path to configuration file
        #[arg(long, default_value = "./schemaguard.json")]
        config: PathBuf,

        #[arg(long)]
        collection: String,

        #[arg(long)]
        field: String,

        /// Option to add; repeat for several
        #[arg(long = "value", required = true)]
        values: Vec<String>,
    },

    /// Regenerate the migration draft from the change log
    Stub {
        /// Path to configuration file
        #[arg(long, default_value = "./schemaguard.json")]
        config: PathBuf,

        /// Only changes from this run (default: the latest run)
        #[arg(long)]
        run: Option<String>,
    },

    /// Print a declared collection schema
    Show {
        /// Path to configuration file
        #[arg(long, default_value = "./schemaguard.json")]
        config: PathBuf,

        collection: String,

        /// Include the live schema from the cache
        #[arg(long)]
        live: bool,
    },

    /// List records of a collection
    Query {
        /// Path to configuration file
        #[arg(long, default_value = "./schemaguard.json")]
        config: PathBuf,

        #[arg(long)]
        collection: String,

        /// Record filter as JSON, e.g. {"op":"equals","field":...,"value":...}
        #[arg(long)]
        filter: Option<String>,
    },

    /// Clear the run guard after a paused series of failed scans
    ResetGuard {
        /// Path to configuration file
        #[arg(long, default_value = "./schemaguard.json")]
        config: PathBuf,
    },
}

impl Command {
    pub fn config_path(&self) -> &PathBuf {
        match self {
            Command::Scan { config, .. }
            | Command::Watch { config }
            | Command::Write { config, .. }
            | Command::EnsureOption { config, .. }
            | Command::Stub { config, .. }
            | Command::Show { config, .. }
            | Command::Query { config, .. }
            | Command::ResetGuard { config } => config,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
