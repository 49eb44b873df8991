use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use procura_core::authz::ApprovalAuthority;
use procura_core::config::WorkflowConfig;
use procura_core::domain::budget::{Budget, BudgetStatus, DepartmentId};
use procura_core::domain::history::{ApprovalDecision, ApprovalLevel};
use procura_core::domain::request::{
    validate_items, PurchaseRequest, RequestId, RequestItem, RequestNumber,
};
use procura_core::errors::{DomainError, ValidationError};
use procura_core::flows::{LedgerEffect, RequestFlow, WorkflowCommand};
use procura_core::numbering::RequestNumberFormat;
use procura_db::repositories::{
    BudgetLedger, BudgetWrite, HistoryRepository, InMemoryStore, RepositoryError,
    RequestNumberGenerator, RequestRepository, SqlBudgetLedger, SqlHistoryRepository,
    SqlRequestNumbers, SqlRequestRepository, SqlTransitionStore, TransitionPlan, TransitionStore,
};
use procura_db::DbPool;

use crate::errors::WorkflowError;

/// The command surface of the approval workflow.
///
/// Every mutating command follows the same discipline: read fresh state,
/// run the transition table, compute the ledger arithmetic in memory, and
/// hand the whole result to the transition store, which lands the budget
/// write, the status write, and the decision append atomically. A stale
/// row version rolls everything back, and the command restarts from a
/// fresh read, bounded by `workflow.max_conflict_retries`.
pub struct RequestWorkflow {
    requests: Arc<dyn RequestRepository>,
    budgets: Arc<dyn BudgetLedger>,
    history: Arc<dyn HistoryRepository>,
    numbers: Arc<dyn RequestNumberGenerator>,
    transitions: Arc<dyn TransitionStore>,
    authority: Arc<dyn ApprovalAuthority>,
    max_conflict_retries: u32,
}

impl RequestWorkflow {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        budgets: Arc<dyn BudgetLedger>,
        history: Arc<dyn HistoryRepository>,
        numbers: Arc<dyn RequestNumberGenerator>,
        transitions: Arc<dyn TransitionStore>,
        authority: Arc<dyn ApprovalAuthority>,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            requests,
            budgets,
            history,
            numbers,
            transitions,
            authority,
            max_conflict_retries: config.max_conflict_retries.max(1),
        }
    }

    /// Wire the workflow against an SQLite pool with the SQL-backed
    /// repositories.
    pub fn with_sqlite(
        pool: DbPool,
        authority: Arc<dyn ApprovalAuthority>,
        config: &WorkflowConfig,
    ) -> Self {
        let format = RequestNumberFormat::new(config.request_number_prefix.clone());
        Self::new(
            Arc::new(SqlRequestRepository::new(pool.clone())),
            Arc::new(
                SqlBudgetLedger::new(pool.clone()).with_max_attempts(config.max_conflict_retries),
            ),
            Arc::new(SqlHistoryRepository::new(pool.clone())),
            Arc::new(SqlRequestNumbers::new(pool.clone()).with_format(format)),
            Arc::new(SqlTransitionStore::new(pool)),
            authority,
            config,
        )
    }

    /// Wire the workflow against a single in-memory store.
    pub fn in_memory(authority: Arc<dyn ApprovalAuthority>, config: &WorkflowConfig) -> Self {
        let store = Arc::new(
            InMemoryStore::new()
                .with_format(RequestNumberFormat::new(config.request_number_prefix.clone())),
        );
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            authority,
            config,
        )
    }

    /// Allocate a budget row for a (department, fiscal year) pair. Budgets
    /// are only ever created through this explicit setup call; submission
    /// never creates one implicitly.
    pub async fn create_budget(
        &self,
        department_id: DepartmentId,
        fiscal_year: i32,
        total_amount: Decimal,
    ) -> Result<Budget, WorkflowError> {
        let budget = Budget::new(department_id, fiscal_year, total_amount)?;

        match self.budgets.create_budget(&budget).await {
            Ok(()) => {
                tracing::info!(
                    department = %budget.department_id.0,
                    fiscal_year = budget.fiscal_year,
                    total = %budget.total_amount,
                    "budget allocated"
                );
                Ok(budget)
            }
            Err(RepositoryError::Duplicate { .. }) => Err(WorkflowError::BudgetAlreadyExists {
                department: budget.department_id.0.clone(),
                fiscal_year: budget.fiscal_year,
            }),
            Err(error) => Err(error.into()),
        }
    }

    /// Open a draft request owned by the requester. Items stay editable
    /// (by replacing them at submission) until the request leaves Draft.
    pub async fn create_draft(
        &self,
        requester_id: &str,
        department_id: DepartmentId,
        fiscal_year: i32,
        items: Vec<RequestItem>,
    ) -> Result<PurchaseRequest, WorkflowError> {
        let request = PurchaseRequest::draft(requester_id, department_id, fiscal_year, items);
        self.requests.create_draft(&request).await?;

        tracing::info!(
            request_id = %request.id.0,
            department = %request.department_id.0,
            "purchase request drafted"
        );
        Ok(request)
    }

    /// Submit a draft with its finalized item list. Reserves the total
    /// against the department budget and assigns the request number; on
    /// `InsufficientBudget` the request stays in Draft with no mutation.
    pub async fn submit(
        &self,
        request_id: &RequestId,
        items: Vec<RequestItem>,
    ) -> Result<PurchaseRequest, WorkflowError> {
        validate_items(&items)?;
        let total: Decimal = items.iter().map(RequestItem::line_total).sum();
        let mut assigned_number: Option<RequestNumber> = None;

        for attempt in 1..=self.max_conflict_retries {
            let request = self.load_request(request_id).await?;
            let outcome = RequestFlow::transition(&request.status, &WorkflowCommand::Submit)?;

            let budget = self
                .budgets
                .find_budget(&request.department_id, request.fiscal_year)
                .await?
                .ok_or_else(|| ValidationError::NoBudgetAllocated {
                    department: request.department_id.0.clone(),
                    fiscal_year: request.fiscal_year,
                })?;

            let expected_budget_version = budget.version;
            let mut held = budget;
            self.apply_effect(&request, &mut held, outcome.effect, total)?;
            held.version += 1;
            held.updated_at = Utc::now();

            // The number is fetched once per command; conflict retries
            // reuse it rather than burning another one.
            let number = match &assigned_number {
                Some(number) => number.clone(),
                None => {
                    let number =
                        self.numbers.next_request_number(request.fiscal_year).await?;
                    assigned_number = Some(number.clone());
                    number
                }
            };

            let now = Utc::now();
            let mut updated = request.clone();
            updated.request_number = Some(number);
            updated.items = items.clone();
            updated.total_amount = total;
            updated.status = outcome.to.clone();
            updated.submitted_at = Some(now);
            updated.version = request.version + 1;
            updated.updated_at = now;

            let decision = ApprovalDecision::record(
                request.id.clone(),
                outcome.level,
                request.requester_id.as_str(),
                outcome.action,
                None,
                total,
                held.available_amount(),
            );

            let remaining = held.available_amount();
            let plan = TransitionPlan {
                request: updated.clone(),
                expected_request_version: request.version,
                budget: Some(BudgetWrite {
                    budget: held,
                    expected_version: expected_budget_version,
                }),
                replace_items: true,
                decision,
            };

            match self.transitions.apply(&plan).await {
                Ok(()) => {
                    tracing::info!(
                        request_id = %updated.id.0,
                        department = %updated.department_id.0,
                        amount = %total,
                        remaining_budget = %remaining,
                        "purchase request submitted"
                    );
                    return Ok(updated);
                }
                Err(RepositoryError::Conflict { entity }) => {
                    tracing::warn!(
                        request_id = %request_id.0,
                        entity,
                        attempt,
                        "optimistic conflict during submit; retrying from a fresh read"
                    );
                    continue;
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(WorkflowError::ConcurrencyConflict { attempts: self.max_conflict_retries })
    }

    /// Level-1 (manager) approval. Leaves the reservation in place.
    pub async fn approve_level1(
        &self,
        request_id: &RequestId,
        approver_id: &str,
    ) -> Result<PurchaseRequest, WorkflowError> {
        for attempt in 1..=self.max_conflict_retries {
            let request = self.load_request(request_id).await?;
            let outcome =
                RequestFlow::transition(&request.status, &WorkflowCommand::ApproveLevel1)?;
            self.authorize_decision(approver_id, &request, outcome.level, "approve")?;

            let budget = self.require_budget(&request).await?;

            let now = Utc::now();
            let mut updated = request.clone();
            updated.status = outcome.to.clone();
            updated.manager_approver_id = Some(approver_id.to_string());
            updated.manager_approved_at = Some(now);
            updated.version = request.version + 1;
            updated.updated_at = now;

            let decision = ApprovalDecision::record(
                request.id.clone(),
                outcome.level,
                approver_id,
                outcome.action,
                None,
                request.total_amount,
                budget.available_amount(),
            );

            let plan = TransitionPlan {
                request: updated.clone(),
                expected_request_version: request.version,
                budget: None,
                replace_items: false,
                decision,
            };

            match self.transitions.apply(&plan).await {
                Ok(()) => {
                    tracing::info!(
                        request_id = %updated.id.0,
                        approver = approver_id,
                        "manager approval recorded"
                    );
                    return Ok(updated);
                }
                Err(RepositoryError::Conflict { entity }) => {
                    tracing::warn!(request_id = %request_id.0, entity, attempt, "optimistic conflict; retrying");
                    continue;
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(WorkflowError::ConcurrencyConflict { attempts: self.max_conflict_retries })
    }

    /// Level-2 (finance) approval: the only transition that permanently
    /// consumes budget, moving the reserved amount into current usage.
    pub async fn approve_level2(
        &self,
        request_id: &RequestId,
        approver_id: &str,
    ) -> Result<PurchaseRequest, WorkflowError> {
        for attempt in 1..=self.max_conflict_retries {
            let request = self.load_request(request_id).await?;
            let outcome =
                RequestFlow::transition(&request.status, &WorkflowCommand::ApproveLevel2)?;
            self.authorize_decision(approver_id, &request, outcome.level, "approve")?;

            let budget = self.require_budget(&request).await?;
            let expected_budget_version = budget.version;
            let mut held = budget;
            self.apply_effect(&request, &mut held, outcome.effect, request.total_amount)?;
            held.version += 1;
            held.updated_at = Utc::now();

            let now = Utc::now();
            let mut updated = request.clone();
            updated.status = outcome.to.clone();
            updated.finance_approver_id = Some(approver_id.to_string());
            updated.finance_approved_at = Some(now);
            updated.version = request.version + 1;
            updated.updated_at = now;

            let decision = ApprovalDecision::record(
                request.id.clone(),
                outcome.level,
                approver_id,
                outcome.action,
                None,
                request.total_amount,
                held.available_amount(),
            );

            let plan = TransitionPlan {
                request: updated.clone(),
                expected_request_version: request.version,
                budget: Some(BudgetWrite {
                    budget: held,
                    expected_version: expected_budget_version,
                }),
                replace_items: false,
                decision,
            };

            match self.transitions.apply(&plan).await {
                Ok(()) => {
                    tracing::info!(
                        request_id = %updated.id.0,
                        approver = approver_id,
                        amount = %updated.total_amount,
                        "finance approval recorded; budget committed"
                    );
                    return Ok(updated);
                }
                Err(RepositoryError::Conflict { entity }) => {
                    tracing::warn!(request_id = %request_id.0, entity, attempt, "optimistic conflict; retrying");
                    continue;
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(WorkflowError::ConcurrencyConflict { attempts: self.max_conflict_retries })
    }

    /// Reject a pending request, releasing its reservation. A non-blank
    /// reason is mandatory and is recorded on both the request and the
    /// decision row.
    pub async fn reject(
        &self,
        request_id: &RequestId,
        approver_id: &str,
        reason: &str,
    ) -> Result<PurchaseRequest, WorkflowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::MissingRejectionReason.into());
        }

        for attempt in 1..=self.max_conflict_retries {
            let request = self.load_request(request_id).await?;
            let outcome = RequestFlow::transition(&request.status, &WorkflowCommand::Reject)?;
            self.authorize_decision(approver_id, &request, outcome.level, "reject")?;

            let budget = self.require_budget(&request).await?;
            let expected_budget_version = budget.version;
            let mut held = budget;
            self.apply_effect(&request, &mut held, outcome.effect, request.total_amount)?;
            held.version += 1;
            held.updated_at = Utc::now();

            let now = Utc::now();
            let mut updated = request.clone();
            updated.status = outcome.to.clone();
            updated.rejected_by_id = Some(approver_id.to_string());
            updated.rejected_at = Some(now);
            updated.rejection_reason = Some(reason.to_string());
            updated.version = request.version + 1;
            updated.updated_at = now;

            let decision = ApprovalDecision::record(
                request.id.clone(),
                outcome.level,
                approver_id,
                outcome.action,
                Some(reason.to_string()),
                request.total_amount,
                held.available_amount(),
            );

            let plan = TransitionPlan {
                request: updated.clone(),
                expected_request_version: request.version,
                budget: Some(BudgetWrite {
                    budget: held,
                    expected_version: expected_budget_version,
                }),
                replace_items: false,
                decision,
            };

            match self.transitions.apply(&plan).await {
                Ok(()) => {
                    tracing::info!(
                        request_id = %updated.id.0,
                        approver = approver_id,
                        reason,
                        "purchase request rejected; reservation released"
                    );
                    return Ok(updated);
                }
                Err(RepositoryError::Conflict { entity }) => {
                    tracing::warn!(request_id = %request_id.0, entity, attempt, "optimistic conflict; retrying");
                    continue;
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(WorkflowError::ConcurrencyConflict { attempts: self.max_conflict_retries })
    }

    /// Cancel a request. Only its requester or an administrator may do so.
    /// Pending requests release their reservation; drafts carry none.
    pub async fn cancel(
        &self,
        request_id: &RequestId,
        actor_id: &str,
    ) -> Result<PurchaseRequest, WorkflowError> {
        for attempt in 1..=self.max_conflict_retries {
            let request = self.load_request(request_id).await?;
            let outcome = RequestFlow::transition(&request.status, &WorkflowCommand::Cancel)?;

            if actor_id != request.requester_id && !self.authority.is_admin(actor_id) {
                return Err(WorkflowError::Unauthorized {
                    actor_id: actor_id.to_string(),
                    action: "cancel this request".to_string(),
                });
            }

            let (budget_write, remaining) = match outcome.effect {
                LedgerEffect::None => {
                    let remaining = self
                        .budgets
                        .find_budget(&request.department_id, request.fiscal_year)
                        .await?
                        .map(|budget| budget.available_amount())
                        .unwrap_or(Decimal::ZERO);
                    (None, remaining)
                }
                _ => {
                    let budget = self.require_budget(&request).await?;
                    let expected_budget_version = budget.version;
                    let mut held = budget;
                    self.apply_effect(&request, &mut held, outcome.effect, request.total_amount)?;
                    held.version += 1;
                    held.updated_at = Utc::now();
                    let remaining = held.available_amount();
                    (
                        Some(BudgetWrite {
                            budget: held,
                            expected_version: expected_budget_version,
                        }),
                        remaining,
                    )
                }
            };

            let now = Utc::now();
            let mut updated = request.clone();
            updated.status = outcome.to.clone();
            updated.version = request.version + 1;
            updated.updated_at = now;

            let decision = ApprovalDecision::record(
                request.id.clone(),
                outcome.level,
                actor_id,
                outcome.action,
                None,
                request.total_amount,
                remaining,
            );

            let plan = TransitionPlan {
                request: updated.clone(),
                expected_request_version: request.version,
                budget: budget_write,
                replace_items: false,
                decision,
            };

            match self.transitions.apply(&plan).await {
                Ok(()) => {
                    tracing::info!(
                        request_id = %updated.id.0,
                        actor = actor_id,
                        from = ?outcome.from,
                        "purchase request cancelled"
                    );
                    return Ok(updated);
                }
                Err(RepositoryError::Conflict { entity }) => {
                    tracing::warn!(request_id = %request_id.0, entity, attempt, "optimistic conflict; retrying");
                    continue;
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(WorkflowError::ConcurrencyConflict { attempts: self.max_conflict_retries })
    }

    pub async fn find_request(
        &self,
        request_id: &RequestId,
    ) -> Result<PurchaseRequest, WorkflowError> {
        self.load_request(request_id).await
    }

    pub async fn list_department_requests(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
    ) -> Result<Vec<PurchaseRequest>, WorkflowError> {
        Ok(self.requests.list_for_department(department_id, fiscal_year).await?)
    }

    pub async fn budget_status(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
    ) -> Result<BudgetStatus, WorkflowError> {
        self.budgets.budget_status(department_id, fiscal_year).await?.ok_or_else(|| {
            ValidationError::NoBudgetAllocated {
                department: department_id.0.clone(),
                fiscal_year,
            }
            .into()
        })
    }

    /// The decision log for a request, ordered oldest first.
    pub async fn approval_history(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalDecision>, WorkflowError> {
        self.load_request(request_id).await?;
        Ok(self.history.list_for_request(request_id).await?)
    }

    async fn load_request(&self, id: &RequestId) -> Result<PurchaseRequest, WorkflowError> {
        self.requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| WorkflowError::RequestNotFound { id: id.0.clone() })
    }

    async fn require_budget(&self, request: &PurchaseRequest) -> Result<Budget, WorkflowError> {
        let found =
            self.budgets.find_budget(&request.department_id, request.fiscal_year).await?;

        let Some(budget) = found else {
            let error = DomainError::InvariantViolation(format!(
                "no budget row for department `{}` fiscal year {} behind request `{}`",
                request.department_id.0, request.fiscal_year, request.id.0
            ));
            tracing::error!(request_id = %request.id.0, %error, "budget row missing for an in-flight request");
            return Err(error.into());
        };

        Ok(budget)
    }

    fn apply_effect(
        &self,
        request: &PurchaseRequest,
        budget: &mut Budget,
        effect: LedgerEffect,
        amount: Decimal,
    ) -> Result<(), WorkflowError> {
        let result = match effect {
            LedgerEffect::None => Ok(()),
            LedgerEffect::Reserve => budget.reserve(amount),
            LedgerEffect::Commit => budget.commit(amount),
            LedgerEffect::Release => budget.release(amount),
        };

        result.map_err(|error| {
            if matches!(error, DomainError::InvariantViolation(_)) {
                tracing::error!(
                    request_id = %request.id.0,
                    department = %budget.department_id.0,
                    fiscal_year = budget.fiscal_year,
                    %error,
                    "budget ledger precondition violated"
                );
            }
            error.into()
        })
    }

    fn authorize_decision(
        &self,
        approver_id: &str,
        request: &PurchaseRequest,
        level: ApprovalLevel,
        verb: &str,
    ) -> Result<(), WorkflowError> {
        let allowed = match level {
            ApprovalLevel::Manager => {
                self.authority.can_approve_level1(approver_id)
                    || self.authority.can_approve_level2(approver_id)
                    || self.authority.is_department_manager(approver_id, &request.department_id)
            }
            ApprovalLevel::Finance => self.authority.can_approve_level2(approver_id),
        };

        if allowed {
            return Ok(());
        }

        let stage = match level {
            ApprovalLevel::Manager => "manager",
            ApprovalLevel::Finance => "finance",
        };
        Err(WorkflowError::Unauthorized {
            actor_id: approver_id.to_string(),
            action: format!("{verb} at {stage} level"),
        })
    }
}
