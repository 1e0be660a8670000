//! Error types for storage preparation
//!
//! Provides structured error types for the preparation workflow, the
//! backend adapters, and the diagnostics gathered during an SCM run.

use crate::domain::ports::ScmState;
use thiserror::Error;

/// Unified error type for storage preparation
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("--scm-only and --nvme-only should not be set together")]
    ScopeConflict,

    #[error("number of namespaces per socket should be at least 1, got {0}")]
    InvalidNamespaceCount(u32),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Consent
    // =========================================================================
    #[error("consent not given")]
    ConsentNotGiven,

    // =========================================================================
    // SCM Preparation Outcomes
    // =========================================================================
    #[error("no SCM modules detected")]
    NoScmModules,

    #[error("failed to create regions")]
    RegionsNotCreated,

    #[error("failed to create namespaces")]
    NamespacesNotCreated,

    #[error("failed to find namespaces")]
    NamespacesNotFound,

    #[error("unexpected state: {0}")]
    UnexpectedScmState(ScmState),

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Backend operation failed: {backend} - {operation}: {reason}")]
    BackendOperationFailed {
        backend: String,
        operation: String,
        reason: String,
    },

    #[error("Command failed: {command} - {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Unable to resolve target user: {0}")]
    UserResolution(String),

    // =========================================================================
    // Aggregated Diagnostics
    // =========================================================================
    #[error("{}", join_errors(.0))]
    Multiple(Vec<Error>),

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad classification of an error, used when reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Request was rejected before any backend interaction
    Validation,
    /// Operator declined, or nobody was there to answer
    ConsentDenied,
    /// Backend tooling failed to run or reported failure
    Backend,
    /// Backend response contradicts what this layer expects of it
    UnexpectedState,
    /// Preparation made no progress
    Operational,
}

impl Error {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ScopeConflict | Error::InvalidNamespaceCount(_) | Error::Configuration(_) => {
                ErrorCategory::Validation
            }

            Error::ConsentNotGiven => ErrorCategory::ConsentDenied,

            Error::BackendOperationFailed { .. }
            | Error::CommandFailed { .. }
            | Error::UserResolution(_)
            | Error::JsonParse(_)
            | Error::Io(_) => ErrorCategory::Backend,

            Error::UnexpectedScmState(_) => ErrorCategory::UnexpectedState,

            Error::NoScmModules
            | Error::RegionsNotCreated
            | Error::NamespacesNotCreated
            | Error::NamespacesNotFound => ErrorCategory::Operational,

            // A concatenation is as severe as its first cause
            Error::Multiple(errors) => errors
                .first()
                .map(Error::category)
                .unwrap_or(ErrorCategory::Operational),
        }
    }

    /// Check if this error was raised by request validation
    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    /// Build a backend failure for the given backend and operation
    pub fn backend(
        backend: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::BackendOperationFailed {
            backend: backend.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for storage preparation
pub type Result<T> = std::result::Result<T, Error>;
