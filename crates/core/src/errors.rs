use rust_decimal::Decimal;
use thiserror::Error;

use crate::flows::FlowTransitionError;

/// Failures raised by the budget arithmetic and the request state machine.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("insufficient budget: requested {requested}, available {available}")]
    InsufficientBudget { requested: Decimal, available: Decimal },
    #[error(transparent)]
    Transition(#[from] FlowTransitionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A ledger precondition was broken by the caller. This is a workflow
    /// bug, not a recoverable condition; the ledger row is left untouched.
    #[error("budget invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request must contain at least one line item")]
    EmptyItems,
    #[error("item `{name}` must have a quantity of at least 1")]
    NonPositiveQuantity { name: String },
    #[error("item `{name}` must have a positive unit price")]
    NonPositiveUnitPrice { name: String },
    #[error("a rejection reason is required")]
    MissingRejectionReason,
    #[error("budget total must not be negative")]
    NegativeBudgetTotal,
    #[error("no budget allocated for department `{department}` in fiscal year {fiscal_year}")]
    NoBudgetAllocated { department: String, fiscal_year: i32 },
}
