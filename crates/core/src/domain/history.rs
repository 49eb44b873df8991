use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

/// The approval stage a decision was taken at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    Manager,
    Finance,
}

impl ApprovalLevel {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Manager => 1,
            Self::Finance => 2,
        }
    }

    pub fn parse(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Manager),
            2 => Some(Self::Finance),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Submitted,
    Approved,
    Rejected,
    Cancelled,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// One immutable row of the approval audit log.
///
/// `request_amount` and `remaining_budget` snapshot the request total and
/// the department's available budget immediately after the decision, so
/// the full financial context of every event can be reconstructed later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub id: DecisionId,
    pub request_id: RequestId,
    pub level: ApprovalLevel,
    pub approver_id: String,
    pub action: DecisionAction,
    pub note: Option<String>,
    pub request_amount: Decimal,
    pub remaining_budget: Decimal,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalDecision {
    pub fn record(
        request_id: RequestId,
        level: ApprovalLevel,
        approver_id: impl Into<String>,
        action: DecisionAction,
        note: Option<String>,
        request_amount: Decimal,
        remaining_budget: Decimal,
    ) -> Self {
        Self {
            id: DecisionId(Uuid::new_v4().to_string()),
            request_id,
            level,
            approver_id: approver_id.into(),
            action,
            note,
            request_amount,
            remaining_budget,
            decided_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ApprovalDecision, ApprovalLevel, DecisionAction};
    use crate::domain::request::RequestId;

    #[test]
    fn level_round_trips_from_storage_encoding() {
        for level in [ApprovalLevel::Manager, ApprovalLevel::Finance] {
            assert_eq!(ApprovalLevel::parse(level.as_i64()), Some(level));
        }
        assert_eq!(ApprovalLevel::parse(3), None);
    }

    #[test]
    fn action_round_trips_from_storage_encoding() {
        let cases = [
            DecisionAction::Submitted,
            DecisionAction::Approved,
            DecisionAction::Rejected,
            DecisionAction::Cancelled,
        ];

        for action in cases {
            assert_eq!(DecisionAction::parse(action.as_str()), Some(action));
        }
    }

    #[test]
    fn record_snapshots_amount_and_remaining_budget() {
        let decision = ApprovalDecision::record(
            RequestId("req-1".to_string()),
            ApprovalLevel::Finance,
            "u-finance",
            DecisionAction::Approved,
            None,
            Decimal::new(300_000_00, 2),
            Decimal::new(700_000_00, 2),
        );

        assert_eq!(decision.level.as_i64(), 2);
        assert_eq!(decision.request_amount, Decimal::new(300_000_00, 2));
        assert_eq!(decision.remaining_budget, Decimal::new(700_000_00, 2));
        assert!(!decision.id.0.is_empty());
    }
}
