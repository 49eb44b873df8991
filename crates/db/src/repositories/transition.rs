use super::budget::update_budget_row;
use super::history::insert_decision;
use super::request::{replace_request_items, update_request_row};
use super::{RepositoryError, TransitionPlan, TransitionStore};
use crate::DbPool;

/// Persists a workflow transition as one SQLite transaction: the budget
/// compare-and-swap (when the transition carries a ledger effect), the
/// request compare-and-swap, and the decision append either all land or
/// none of them do. A stale version on either row rolls the whole
/// transaction back as [`RepositoryError::Conflict`], leaving the caller
/// to retry from a fresh read.
pub struct SqlTransitionStore {
    pool: DbPool,
}

impl SqlTransitionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TransitionStore for SqlTransitionStore {
    async fn apply(&self, plan: &TransitionPlan) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some(write) = &plan.budget {
            let updated = update_budget_row(&mut *tx, &write.budget, write.expected_version).await?;
            if !updated {
                tx.rollback().await?;
                return Err(RepositoryError::Conflict { entity: "budget" });
            }
        }

        let updated =
            update_request_row(&mut *tx, &plan.request, plan.expected_request_version).await?;
        if !updated {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict { entity: "purchase_request" });
        }

        if plan.replace_items {
            replace_request_items(&mut *tx, &plan.request).await?;
        }

        insert_decision(&mut *tx, &plan.decision).await?;

        tx.commit().await?;
        Ok(())
    }
}
