use thiserror::Error;

use procura_core::errors::{DomainError, ValidationError};
use procura_core::flows::FlowTransitionError;
use procura_db::repositories::RepositoryError;

/// The failure surface of the workflow commands. Every variant is a
/// distinct, typed outcome; callers never need to parse messages.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("purchase request `{id}` was not found")]
    RequestNotFound { id: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("actor `{actor_id}` is not authorized to {action}")]
    Unauthorized { actor_id: String, action: String },
    #[error("budget already exists for department `{department}` in fiscal year {fiscal_year}")]
    BudgetAlreadyExists { department: String, fiscal_year: i32 },
    /// The command kept losing optimistic-concurrency races. The caller
    /// may retry the whole command; no partial state was left behind.
    #[error("command abandoned after {attempts} conflicting attempts")]
    ConcurrencyConflict { attempts: u32 },
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<FlowTransitionError> for WorkflowError {
    fn from(error: FlowTransitionError) -> Self {
        Self::Domain(DomainError::Transition(error))
    }
}

impl From<ValidationError> for WorkflowError {
    fn from(error: ValidationError) -> Self {
        Self::Domain(DomainError::Validation(error))
    }
}

impl From<RepositoryError> for WorkflowError {
    fn from(error: RepositoryError) -> Self {
        Self::Repository(error)
    }
}
