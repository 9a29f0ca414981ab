//! Safe-write subsystem
//!
//! Validation before any remote mutation, additive option extension, and
//! post-write verification with non-fatal warnings.

mod options;
mod result;
mod validating;
mod verifier;

pub use options::{OptionExtender, OptionOutcome};
pub use result::{WriteResult, WriteState};
pub use validating::{ValidatingWriter, WritePolicy};
pub use verifier::PostWriteVerifier;
