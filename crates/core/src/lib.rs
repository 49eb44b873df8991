pub mod authz;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod numbering;

pub use authz::{ApprovalAuthority, StaticAuthority};
pub use domain::budget::{Budget, BudgetId, BudgetStatus, DepartmentId};
pub use domain::history::{ApprovalDecision, ApprovalLevel, DecisionAction, DecisionId};
pub use domain::request::{
    validate_items, PurchaseRequest, RequestId, RequestItem, RequestNumber, RequestStatus,
};
pub use errors::{DomainError, ValidationError};
pub use flows::{
    FlowTransitionError, LedgerEffect, RequestFlow, TransitionOutcome, WorkflowCommand,
};
pub use numbering::RequestNumberFormat;
