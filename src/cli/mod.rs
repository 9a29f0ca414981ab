//! CLI module for schemaguard
//!
//! Provides command-line interface for:
//! - scan / watch: drift detection once or on a schedule
//! - write / ensure-option: validated writes and option extension
//! - stub / show / query / reset-guard: inspection and maintenance

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    ensure_option, query, reset_guard, run, run_command, scan, show_declared, show_live, stub,
    watch, write,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{parse_fields, read_request, write_error, write_response};
