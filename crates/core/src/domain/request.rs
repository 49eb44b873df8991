use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::budget::DepartmentId;
use crate::errors::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Human-readable request number, assigned once at submission.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestNumber(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    PendingManager,
    PendingFinance,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingManager => "pending_manager",
            Self::PendingFinance => "pending_finance",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending_manager" => Some(Self::PendingManager),
            "pending_finance" => Some(Self::PendingFinance),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl RequestItem {
    pub fn line_total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

/// A purchase request. Owned by the requester while in `Draft`; owned by
/// the workflow from submission onward. Line items and the total are
/// frozen at submission time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: RequestId,
    pub request_number: Option<RequestNumber>,
    pub requester_id: String,
    pub department_id: DepartmentId,
    pub fiscal_year: i32,
    pub items: Vec<RequestItem>,
    pub total_amount: Decimal,
    pub status: RequestStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub manager_approver_id: Option<String>,
    pub manager_approved_at: Option<DateTime<Utc>>,
    pub finance_approver_id: Option<String>,
    pub finance_approved_at: Option<DateTime<Utc>>,
    pub rejected_by_id: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRequest {
    pub fn draft(
        requester_id: impl Into<String>,
        department_id: DepartmentId,
        fiscal_year: i32,
        items: Vec<RequestItem>,
    ) -> Self {
        let now = Utc::now();
        let total_amount = items.iter().map(RequestItem::line_total).sum();

        Self {
            id: RequestId(Uuid::new_v4().to_string()),
            request_number: None,
            requester_id: requester_id.into(),
            department_id,
            fiscal_year,
            items,
            total_amount,
            status: RequestStatus::Draft,
            submitted_at: None,
            manager_approver_id: None,
            manager_approved_at: None,
            finance_approver_id: None,
            finance_approved_at: None,
            rejected_by_id: None,
            rejected_at: None,
            rejection_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Submission-time item validation: at least one item, every quantity at
/// least 1, every unit price positive.
pub fn validate_items(items: &[RequestItem]) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::EmptyItems);
    }

    for item in items {
        if item.quantity == 0 {
            return Err(ValidationError::NonPositiveQuantity { name: item.name.clone() });
        }
        if item.unit_price <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveUnitPrice { name: item.name.clone() });
        }
    }

    Ok(())
}
