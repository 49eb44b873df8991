use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use procura_core::domain::budget::{Budget, BudgetStatus, DepartmentId};
use procura_core::domain::history::ApprovalDecision;
use procura_core::domain::request::{PurchaseRequest, RequestId, RequestNumber};
use procura_core::errors::DomainError;

pub mod budget;
pub mod history;
pub mod memory;
pub mod numbering;
pub mod request;
pub mod transition;

pub use budget::SqlBudgetLedger;
pub use history::SqlHistoryRepository;
pub use memory::InMemoryStore;
pub use numbering::SqlRequestNumbers;
pub use request::SqlRequestRepository;
pub use transition::SqlTransitionStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    /// An optimistic compare-and-swap write found a stale row version.
    #[error("concurrent update conflict on {entity}")]
    Conflict { entity: &'static str },
    #[error("{entity} already exists")]
    Duplicate { entity: &'static str },
}

/// Failures of the standalone ledger operations, which combine domain
/// arithmetic with the optimistic persistence write.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("budget update conflicted {attempts} times; giving up")]
    RetriesExhausted { attempts: u32 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// The budget ledger: one row per (department, fiscal year), mutated only
/// through the three atomic operations.
#[async_trait]
pub trait BudgetLedger: Send + Sync {
    async fn create_budget(&self, budget: &Budget) -> Result<(), RepositoryError>;

    async fn find_budget(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
    ) -> Result<Option<Budget>, RepositoryError>;

    async fn budget_status(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
    ) -> Result<Option<BudgetStatus>, RepositoryError> {
        Ok(self.find_budget(department_id, fiscal_year).await?.map(|budget| budget.status()))
    }

    async fn reserve(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
        amount: Decimal,
    ) -> Result<Budget, LedgerError>;

    async fn commit(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
        amount: Decimal,
    ) -> Result<Budget, LedgerError>;

    async fn release(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
        amount: Decimal,
    ) -> Result<Budget, LedgerError>;
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn create_draft(&self, request: &PurchaseRequest) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &RequestId)
        -> Result<Option<PurchaseRequest>, RepositoryError>;

    async fn list_for_department(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
    ) -> Result<Vec<PurchaseRequest>, RepositoryError>;
}

/// Append-only decision log. There is no update or delete.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append(&self, decision: &ApprovalDecision) -> Result<(), RepositoryError>;

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalDecision>, RepositoryError>;
}

#[async_trait]
pub trait RequestNumberGenerator: Send + Sync {
    /// Issue the next request number for the fiscal year. Numbers are
    /// globally unique and monotonically increasing within a year; a
    /// number issued for a submission that subsequently fails is never
    /// reissued.
    async fn next_request_number(&self, fiscal_year: i32)
        -> Result<RequestNumber, RepositoryError>;
}

/// The post-transition budget row to persist, with the version the caller
/// read it at. The write succeeds only if the stored version still matches.
#[derive(Clone, Debug)]
pub struct BudgetWrite {
    pub budget: Budget,
    pub expected_version: u32,
}

/// Everything one workflow transition persists: the new request snapshot,
/// the optional budget mutation it carries, and the decision record.
/// [`TransitionStore::apply`] lands all of it atomically or none of it.
#[derive(Clone, Debug)]
pub struct TransitionPlan {
    pub request: PurchaseRequest,
    pub expected_request_version: u32,
    pub budget: Option<BudgetWrite>,
    pub replace_items: bool,
    pub decision: ApprovalDecision,
}

#[async_trait]
pub trait TransitionStore: Send + Sync {
    async fn apply(&self, plan: &TransitionPlan) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_amount(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid amount in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
