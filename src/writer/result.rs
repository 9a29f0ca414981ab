//! Write outcomes
//!
//! A write moves through
//! `Validating -> {Rejected | Writing}`, `Writing -> {Failed | Verifying}`,
//! `Verifying -> {Done | DoneWithWarnings}`; only terminal states are
//! reported.

use serde::Serialize;

use crate::errors::EngineError;

/// Terminal state of a write attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteState {
    /// Local validation failed; nothing was sent
    Rejected,
    /// The remote store refused or could not be reached
    Failed,
    Done,
    /// Committed, but the re-read did not match what was sent
    DoneWithWarnings,
}

/// Outcome of one write attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub success: bool,
    pub record_id: Option<String>,
    pub validation_errors: Vec<String>,
    pub warnings: Vec<String>,
    pub state: WriteState,
}

impl WriteResult {
    pub(crate) fn rejected(errors: &[EngineError]) -> Self {
        Self {
            success: false,
            record_id: None,
            validation_errors: errors.iter().map(describe).collect(),
            warnings: Vec::new(),
            state: WriteState::Rejected,
        }
    }

    pub(crate) fn failed(error: &EngineError, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            record_id: None,
            validation_errors: vec![describe(error)],
            warnings,
            state: WriteState::Failed,
        }
    }

    pub(crate) fn committed(record_id: String, warnings: Vec<String>) -> Self {
        let state = if warnings.is_empty() {
            WriteState::Done
        } else {
            WriteState::DoneWithWarnings
        };
        Self {
            success: true,
            record_id: Some(record_id),
            validation_errors: Vec::new(),
            warnings,
            state,
        }
    }
}

/// `CODE: message` form used in results
pub(crate) fn describe(error: &EngineError) -> String {
    format!("{}: {}", error.code(), error)
}
