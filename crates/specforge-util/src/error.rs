//! Error taxonomy shared by every specforge crate.
//!
//! `SpecforgeError` groups failures into the categories the processor's retry
//! logic and the CLI's exit-code mapping both depend on: whether a failure is
//! retryable, and which human-facing category it belongs to.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse category used for exit-code mapping and SyncState bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    PermissionDenied,
    Conflict,
    Transient,
    Fatal,
    UnknownOperation,
}

/// Library-level error type returned by specforge operations.
///
/// Each variant maps to exactly one [`ErrorCategory`]; [`retryable`](Self::retryable)
/// tells the processor's retry loop whether a failed handler invocation should
/// be retried with backoff or marked terminal immediately.
#[derive(Error, Debug)]
pub enum SpecforgeError {
    #[error("missing or invalid parameter '{param}': {reason}")]
    Validation { param: String, reason: String },

    #[error("specification not found: {spec_id}")]
    SpecNotFound { spec_id: String },

    #[error("task not found: {task_ref} in specification {spec_id}")]
    TaskNotFound { spec_id: String, task_ref: String },

    #[error("user story not found: {story_id} in specification {spec_id}")]
    StoryNotFound { spec_id: String, story_id: String },

    #[error("path escapes project root: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("duplicate operation suppressed: {description}")]
    DuplicateConflict { description: String },

    #[error("concurrent modification detected: {description}")]
    ConcurrentConflict { description: String },

    #[error("artifact modified externally since submission: {description}")]
    VersionMismatch { description: String },

    #[error("dependency not satisfied: {description}")]
    DependencyViolation { description: String },

    #[error("illegal phase transition: {from} -> {to}")]
    IllegalPhaseTransition { from: String, to: String },

    #[error("transient I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("handler timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("internal invariant violated: {0}")]
    Fatal(String),

    #[error("unknown operation type: {0}")]
    UnknownOperation(String),
}

impl SpecforgeError {
    /// Whether the processor should retry a handler that failed with this error.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transient)
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } | Self::IllegalPhaseTransition { .. } => {
                ErrorCategory::Validation
            }
            Self::SpecNotFound { .. } | Self::TaskNotFound { .. } | Self::StoryNotFound { .. } => {
                ErrorCategory::NotFound
            }
            Self::PermissionDenied { .. } => ErrorCategory::PermissionDenied,
            Self::DuplicateConflict { .. }
            | Self::ConcurrentConflict { .. }
            | Self::VersionMismatch { .. } => ErrorCategory::Conflict,
            Self::DependencyViolation { .. } => ErrorCategory::Validation,
            Self::Io(_) | Self::Timeout { .. } | Self::Transient(_) => ErrorCategory::Transient,
            Self::Fatal(_) => ErrorCategory::Fatal,
            Self::UnknownOperation(_) => ErrorCategory::UnknownOperation,
        }
    }
}

pub type Result<T> = std::result::Result<T, SpecforgeError>;
