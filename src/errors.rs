//! Engine error taxonomy
//!
//! Error codes:
//! - SG_CONFIGURATION (FATAL)
//! - SG_REMOTE_UNAVAILABLE (RECOVERABLE)
//! - SG_SCHEMA_NOT_FOUND (REJECT)
//! - SG_VALIDATION_FAILED (REJECT)
//! - SG_WRITE_REJECTED (REJECT)
//! - SG_VERIFICATION_MISMATCH (WARNING)
//! - SG_LOCAL_STATE (RECOVERABLE)
//!
//! Transport errors from the remote store never leave the engine as-is;
//! they are folded into this taxonomy at the component boundary.

use std::fmt;

use thiserror::Error;

use crate::remote::RemoteError;

/// Severity levels for engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Process must not continue (startup only)
    Fatal,
    /// Caller may retry, or a scan skips the collection
    Recoverable,
    /// Request refused with no remote side effects
    Reject,
    /// Observability only, the operation already succeeded
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "FATAL"),
            Severity::Recoverable => write!(f, "RECOVERABLE"),
            Severity::Reject => write!(f, "REJECT"),
            Severity::Warning => write!(f, "WARNING"),
        }
    }
}

/// What kind of field-level validation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    /// Field is not declared for the collection
    UnknownField,
    /// Submitted value shape does not match the declared field type
    WrongType,
    /// Enum value is not a known option
    OptionNotAllowed,
}

/// Field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDetails {
    /// Field name as submitted
    pub field: String,
    /// Failure kind
    pub kind: ValidationKind,
    /// Expected type or condition
    pub expected: String,
    /// Actual value or type found
    pub actual: String,
}

impl ValidationDetails {
    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: ValidationKind::UnknownField,
            expected: "declared field".into(),
            actual: "field does not exist".into(),
        }
    }

    pub fn wrong_type(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            kind: ValidationKind::WrongType,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn option_not_allowed(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: ValidationKind::OptionNotAllowed,
            expected: "known option".into(),
            actual: value.into(),
        }
    }
}

impl fmt::Display for ValidationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ValidationKind::UnknownField => {
                write!(f, "field '{}': field does not exist", self.field)
            }
            ValidationKind::WrongType => write!(
                f,
                "field '{}': wrong type, expected {}, got {}",
                self.field, self.expected, self.actual
            ),
            ValidationKind::OptionNotAllowed => write!(
                f,
                "field '{}': value '{}' is not an allowed option",
                self.field, self.actual
            ),
        }
    }
}

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("collection '{0}' not found")]
    SchemaNotFound(String),

    #[error("validation failed: {0}")]
    Validation(ValidationDetails),

    #[error("write rejected by remote store: {0}")]
    WriteRejected(String),

    #[error("verification mismatch: {0}")]
    VerificationMismatch(String),

    #[error("local state error at '{path}': {message}")]
    LocalState { path: String, message: String },
}

impl EngineError {
    /// Create a local persistence error
    pub fn local_state(path: impl Into<String>, message: impl fmt::Display) -> Self {
        EngineError::LocalState {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) => "SG_CONFIGURATION",
            EngineError::RemoteUnavailable(_) => "SG_REMOTE_UNAVAILABLE",
            EngineError::SchemaNotFound(_) => "SG_SCHEMA_NOT_FOUND",
            EngineError::Validation(_) => "SG_VALIDATION_FAILED",
            EngineError::WriteRejected(_) => "SG_WRITE_REJECTED",
            EngineError::VerificationMismatch(_) => "SG_VERIFICATION_MISMATCH",
            EngineError::LocalState { .. } => "SG_LOCAL_STATE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            EngineError::Configuration(_) => Severity::Fatal,
            EngineError::RemoteUnavailable(_) | EngineError::LocalState { .. } => {
                Severity::Recoverable
            }
            EngineError::SchemaNotFound(_)
            | EngineError::Validation(_)
            | EngineError::WriteRejected(_) => Severity::Reject,
            EngineError::VerificationMismatch(_) => Severity::Warning,
        }
    }

    /// Returns validation details if applicable
    pub fn details(&self) -> Option<&ValidationDetails> {
        match self {
            EngineError::Validation(details) => Some(details),
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl From<RemoteError> for EngineError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(id) => EngineError::SchemaNotFound(id),
            RemoteError::Rejected { status, message } => {
                EngineError::WriteRejected(format!("status {}: {}", status, message))
            }
            other => EngineError::RemoteUnavailable(other.to_string()),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
