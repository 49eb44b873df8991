use serde::{Deserialize, Serialize};

use crate::domain::history::{ApprovalLevel, DecisionAction};
use crate::domain::request::RequestStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowCommand {
    Submit,
    ApproveLevel1,
    ApproveLevel2,
    Reject,
    Cancel,
}

impl WorkflowCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::ApproveLevel1 => "approve_level1",
            Self::ApproveLevel2 => "approve_level2",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        }
    }
}

/// The budget-ledger side effect a transition carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEffect {
    None,
    Reserve,
    Commit,
    Release,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub command: WorkflowCommand,
    pub effect: LedgerEffect,
    pub level: ApprovalLevel,
    pub action: DecisionAction,
}
