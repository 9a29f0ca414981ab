//! Schema drift subsystem
//!
//! Detects differences between the declared schema store and the live remote
//! schemas, records them in an append-only change log and drafts migrations.
//! Nothing here ever mutates the remote schema or the schema store.

mod change;
mod changelog;
mod detector;
mod migration;
mod run_state;
mod shape;

pub use change::{Change, ChangeType};
pub use changelog::ChangeLog;
pub use detector::{
    summary_message, CollectionError, DriftDetector, DriftOutcome, ScanReport,
    DEFAULT_MAX_FAILED_ATTEMPTS,
};
pub use migration::{generate_migration_stub, write_migration_stub};
pub use run_state::{RunDecision, RunState, RunStateStore, RunStatus};
pub use shape::{SchemaShape, ShapeDiff};
