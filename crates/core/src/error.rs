//! Domain error model.

use thiserror::Error;

use crate::job::JobStatus;

/// Result type used across the tasking domain.
pub type TaskingResult<T> = Result<T, TaskingError>;

/// Tasking-level error.
///
/// Validation failures are raised at the boundary of submission and result
/// ingestion and never reach the store. Store failures surface as
/// `Persistence` and are not retried here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskingError {
    /// Malformed or missing request fields.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The referenced job or agent does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store failed or refused the operation.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A lifecycle rule was violated.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

impl TaskingError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn invalid_transition(from: JobStatus, to: JobStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            TaskingError::InvalidInput(_) => "invalid_input",
            TaskingError::NotFound(_) => "not_found",
            TaskingError::Persistence(_) => "persistence_error",
            TaskingError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}
