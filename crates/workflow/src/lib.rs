//! Application service for the purchase-request approval workflow.
//!
//! [`RequestWorkflow`] is the command surface surrounding layers call:
//! submit, approve (two levels), reject, cancel, plus the budget-status
//! and approval-history reads. Each command validates its input, runs the
//! state-machine transition from `procura-core`, and persists the result
//! through `procura-db` as one atomic unit, retrying the whole command
//! from a fresh read when an optimistic write conflicts.

pub mod errors;
pub mod service;
pub mod telemetry;

pub use errors::WorkflowError;
pub use service::RequestWorkflow;
