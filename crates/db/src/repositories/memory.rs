use std::collections::HashMap;

use tokio::sync::RwLock;

use procura_core::domain::budget::{Budget, DepartmentId};
use procura_core::domain::history::ApprovalDecision;
use procura_core::domain::request::{PurchaseRequest, RequestId, RequestNumber};
use procura_core::errors::{DomainError, ValidationError};
use procura_core::numbering::RequestNumberFormat;
use rust_decimal::Decimal;

use super::{
    BudgetLedger, HistoryRepository, LedgerError, RepositoryError, RequestNumberGenerator,
    RequestRepository, TransitionPlan, TransitionStore,
};

#[derive(Default)]
struct MemoryState {
    budgets: HashMap<(String, i32), Budget>,
    requests: HashMap<String, PurchaseRequest>,
    decisions: Vec<ApprovalDecision>,
    sequences: HashMap<i32, u64>,
}

/// In-memory implementation of the full persistence boundary, for unit
/// tests and embedding without SQLite. One lock guards all state, so a
/// transition plan applies atomically; version checks still run so the
/// optimistic-concurrency paths behave exactly as they do against SQL.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
    format: RequestNumberFormat,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: RequestNumberFormat) -> Self {
        self.format = format;
        self
    }
}

fn budget_key(department_id: &DepartmentId, fiscal_year: i32) -> (String, i32) {
    (department_id.0.clone(), fiscal_year)
}

fn no_allocation(department_id: &DepartmentId, fiscal_year: i32) -> LedgerError {
    LedgerError::Domain(
        ValidationError::NoBudgetAllocated {
            department: department_id.0.clone(),
            fiscal_year,
        }
        .into(),
    )
}

impl InMemoryStore {
    async fn mutate_budget<F>(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
        mutate: F,
    ) -> Result<Budget, LedgerError>
    where
        F: Fn(&mut Budget) -> Result<(), DomainError>,
    {
        let mut state = self.state.write().await;
        let budget = state
            .budgets
            .get_mut(&budget_key(department_id, fiscal_year))
            .ok_or_else(|| no_allocation(department_id, fiscal_year))?;

        mutate(budget)?;
        budget.version += 1;
        budget.updated_at = chrono::Utc::now();
        Ok(budget.clone())
    }
}

#[async_trait::async_trait]
impl BudgetLedger for InMemoryStore {
    async fn create_budget(&self, budget: &Budget) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let key = budget_key(&budget.department_id, budget.fiscal_year);
        if state.budgets.contains_key(&key) {
            return Err(RepositoryError::Duplicate { entity: "budget" });
        }
        state.budgets.insert(key, budget.clone());
        Ok(())
    }

    async fn find_budget(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
    ) -> Result<Option<Budget>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.budgets.get(&budget_key(department_id, fiscal_year)).cloned())
    }

    async fn reserve(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
        amount: Decimal,
    ) -> Result<Budget, LedgerError> {
        self.mutate_budget(department_id, fiscal_year, |budget| budget.reserve(amount)).await
    }

    async fn commit(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
        amount: Decimal,
    ) -> Result<Budget, LedgerError> {
        self.mutate_budget(department_id, fiscal_year, |budget| budget.commit(amount)).await
    }

    async fn release(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
        amount: Decimal,
    ) -> Result<Budget, LedgerError> {
        self.mutate_budget(department_id, fiscal_year, |budget| budget.release(amount)).await
    }
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryStore {
    async fn create_draft(&self, request: &PurchaseRequest) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.requests.contains_key(&request.id.0) {
            return Err(RepositoryError::Duplicate { entity: "purchase_request" });
        }
        state.requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<PurchaseRequest>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn list_for_department(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
    ) -> Result<Vec<PurchaseRequest>, RepositoryError> {
        let state = self.state.read().await;
        let mut requests: Vec<PurchaseRequest> = state
            .requests
            .values()
            .filter(|request| {
                request.department_id == *department_id && request.fiscal_year == fiscal_year
            })
            .cloned()
            .collect();
        requests.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(requests)
    }
}

#[async_trait::async_trait]
impl HistoryRepository for InMemoryStore {
    async fn append(&self, decision: &ApprovalDecision) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.decisions.push(decision.clone());
        Ok(())
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalDecision>, RepositoryError> {
        let state = self.state.read().await;
        let mut decisions: Vec<ApprovalDecision> = state
            .decisions
            .iter()
            .filter(|decision| decision.request_id == *request_id)
            .cloned()
            .collect();
        decisions.sort_by(|left, right| left.decided_at.cmp(&right.decided_at));
        Ok(decisions)
    }
}

#[async_trait::async_trait]
impl RequestNumberGenerator for InMemoryStore {
    async fn next_request_number(
        &self,
        fiscal_year: i32,
    ) -> Result<RequestNumber, RepositoryError> {
        let mut state = self.state.write().await;
        let counter = state.sequences.entry(fiscal_year).or_insert(0);
        *counter += 1;
        Ok(self.format.render(fiscal_year, *counter))
    }
}

#[async_trait::async_trait]
impl TransitionStore for InMemoryStore {
    async fn apply(&self, plan: &TransitionPlan) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;

        if let Some(write) = &plan.budget {
            let key = budget_key(&write.budget.department_id, write.budget.fiscal_year);
            let stored = state
                .budgets
                .get(&key)
                .ok_or(RepositoryError::Conflict { entity: "budget" })?;
            if stored.version != write.expected_version {
                return Err(RepositoryError::Conflict { entity: "budget" });
            }
        }

        let stored_request = state
            .requests
            .get(&plan.request.id.0)
            .ok_or(RepositoryError::Conflict { entity: "purchase_request" })?;
        if stored_request.version != plan.expected_request_version {
            return Err(RepositoryError::Conflict { entity: "purchase_request" });
        }

        if let Some(write) = &plan.budget {
            let key = budget_key(&write.budget.department_id, write.budget.fiscal_year);
            state.budgets.insert(key, write.budget.clone());
        }
        state.requests.insert(plan.request.id.0.clone(), plan.request.clone());
        state.decisions.push(plan.decision.clone());

        Ok(())
    }
}
