//! Observability subsystem
//!
//! Structured, event-keyed logging on top of `tracing`.
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. Deterministic field ordering
//! 4. Logging failures never abort an operation
//!
//! # Usage
//!
//! ```ignore
//! use schemaguard::observability::{Event, Logger};
//!
//! Logger::info(Event::ScanStart, &[("run_id", "3f2a...")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{render_fields, Logger, Severity};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human-readable text
    #[default]
    Compact,
    /// JSON Lines
    Json,
}

/// Builds the filter: `RUST_LOG` wins, otherwise `level` for this crate and
/// `warn` for the HTTP stack.
fn build_env_filter(level: &str) -> Result<EnvFilter, String> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = format!("warn,schemaguard={},reqwest=warn,hyper=warn", level);
    EnvFilter::try_new(&directives).map_err(|e| format!("invalid log level '{}': {}", level, e))
}

/// Installs the global `tracing` subscriber.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// Installing twice is a no-op.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), String> {
    let filter = build_env_filter(level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    // An already-installed subscriber is fine (tests, repeated CLI setup).
    let _ = installed;
    Ok(())
}

/// Log a lifecycle event
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event, fields);
}
