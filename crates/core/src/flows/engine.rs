use thiserror::Error;

use crate::domain::history::{ApprovalLevel, DecisionAction};
use crate::domain::request::RequestStatus;
use crate::flows::states::{LedgerEffect, TransitionOutcome, WorkflowCommand};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("command {command:?} is not valid for a request in status {status:?}")]
    InvalidTransition { status: RequestStatus, command: WorkflowCommand },
}

/// The purchase-request lifecycle as a single fixed transition table.
///
/// Every `(status, command)` pair not listed in the table is rejected with
/// [`FlowTransitionError::InvalidTransition`]; there is no other path by
/// which a request changes status. The returned outcome names the ledger
/// effect the transition carries and the approval level the decision is
/// recorded at, so callers persist exactly what the table dictates.
pub struct RequestFlow;

impl RequestFlow {
    pub fn initial_status() -> RequestStatus {
        RequestStatus::Draft
    }

    pub fn transition(
        current: &RequestStatus,
        command: &WorkflowCommand,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        use ApprovalLevel::{Finance, Manager};
        use RequestStatus::{Cancelled, Draft, PendingFinance, PendingManager};
        use WorkflowCommand::{ApproveLevel1, ApproveLevel2, Cancel, Reject, Submit};

        let (to, effect, level) = match (current, command) {
            (Draft, Submit) => (PendingManager, LedgerEffect::Reserve, Manager),
            (PendingManager, ApproveLevel1) => (PendingFinance, LedgerEffect::None, Manager),
            (PendingFinance, ApproveLevel2) => {
                (RequestStatus::Approved, LedgerEffect::Commit, Finance)
            }
            (PendingManager, Reject) => (RequestStatus::Rejected, LedgerEffect::Release, Manager),
            (PendingFinance, Reject) => (RequestStatus::Rejected, LedgerEffect::Release, Finance),
            (Draft, Cancel) => (Cancelled, LedgerEffect::None, Manager),
            (PendingManager, Cancel) => (Cancelled, LedgerEffect::Release, Manager),
            (PendingFinance, Cancel) => (Cancelled, LedgerEffect::Release, Finance),
            _ => {
                return Err(FlowTransitionError::InvalidTransition {
                    status: current.clone(),
                    command: command.clone(),
                });
            }
        };

        let action = match command {
            Submit => DecisionAction::Submitted,
            ApproveLevel1 | ApproveLevel2 => DecisionAction::Approved,
            Reject => DecisionAction::Rejected,
            Cancel => DecisionAction::Cancelled,
        };

        Ok(TransitionOutcome {
            from: current.clone(),
            to,
            command: command.clone(),
            effect,
            level,
            action,
        })
    }
}
