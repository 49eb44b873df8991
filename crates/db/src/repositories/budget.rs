use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use procura_core::domain::budget::{Budget, BudgetId, DepartmentId};
use procura_core::errors::{DomainError, ValidationError};

use super::{parse_amount, parse_timestamp, parse_u32, BudgetLedger, LedgerError, RepositoryError};
use crate::DbPool;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub struct SqlBudgetLedger {
    pool: DbPool,
    max_attempts: u32,
}

impl SqlBudgetLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Read-mutate-CAS loop shared by the three ledger operations. Each
    /// attempt re-reads the row, applies the arithmetic, and writes back
    /// guarded by the version it read; a stale version means another
    /// writer landed first, so the attempt restarts from a fresh read.
    async fn mutate_with_retry<F>(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
        mutate: F,
    ) -> Result<Budget, LedgerError>
    where
        F: Fn(&mut Budget) -> Result<(), DomainError>,
    {
        for _ in 0..self.max_attempts {
            let Some(mut budget) = self.find_budget(department_id, fiscal_year).await? else {
                return Err(LedgerError::Domain(
                    ValidationError::NoBudgetAllocated {
                        department: department_id.0.clone(),
                        fiscal_year,
                    }
                    .into(),
                ));
            };

            let expected_version = budget.version;
            mutate(&mut budget)?;
            budget.version += 1;
            budget.updated_at = Utc::now();

            if update_budget_row(&self.pool, &budget, expected_version).await? {
                return Ok(budget);
            }
        }

        Err(LedgerError::RetriesExhausted { attempts: self.max_attempts })
    }
}

#[async_trait::async_trait]
impl BudgetLedger for SqlBudgetLedger {
    async fn create_budget(&self, budget: &Budget) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO budget (
                id,
                department_id,
                fiscal_year,
                total_amount,
                current_usage,
                reserved_amount,
                version,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&budget.id.0)
        .bind(&budget.department_id.0)
        .bind(budget.fiscal_year)
        .bind(budget.total_amount.to_string())
        .bind(budget.current_usage.to_string())
        .bind(budget.reserved_amount.to_string())
        .bind(i64::from(budget.version))
        .bind(budget.created_at.to_rfc3339())
        .bind(budget.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RepositoryError::Duplicate { entity: "budget" })
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn find_budget(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
    ) -> Result<Option<Budget>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                department_id,
                fiscal_year,
                total_amount,
                current_usage,
                reserved_amount,
                version,
                created_at,
                updated_at
             FROM budget
             WHERE department_id = ? AND fiscal_year = ?",
        )
        .bind(&department_id.0)
        .bind(fiscal_year)
        .fetch_optional(&self.pool)
        .await?;

        row.map(budget_from_row).transpose()
    }

    async fn reserve(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
        amount: Decimal,
    ) -> Result<Budget, LedgerError> {
        self.mutate_with_retry(department_id, fiscal_year, |budget| budget.reserve(amount)).await
    }

    async fn commit(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
        amount: Decimal,
    ) -> Result<Budget, LedgerError> {
        self.mutate_with_retry(department_id, fiscal_year, |budget| budget.commit(amount)).await
    }

    async fn release(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
        amount: Decimal,
    ) -> Result<Budget, LedgerError> {
        self.mutate_with_retry(department_id, fiscal_year, |budget| budget.release(amount)).await
    }
}

/// Compare-and-swap write of a budget row. Returns `false` when the stored
/// version no longer matches `expected_version` and nothing was written.
pub(crate) async fn update_budget_row<'e, E>(
    executor: E,
    budget: &Budget,
    expected_version: u32,
) -> Result<bool, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        "UPDATE budget SET
            total_amount = ?,
            current_usage = ?,
            reserved_amount = ?,
            version = ?,
            updated_at = ?
         WHERE department_id = ? AND fiscal_year = ? AND version = ?",
    )
    .bind(budget.total_amount.to_string())
    .bind(budget.current_usage.to_string())
    .bind(budget.reserved_amount.to_string())
    .bind(i64::from(budget.version))
    .bind(budget.updated_at.to_rfc3339())
    .bind(&budget.department_id.0)
    .bind(budget.fiscal_year)
    .bind(i64::from(expected_version))
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn budget_from_row(row: SqliteRow) -> Result<Budget, RepositoryError> {
    Ok(Budget {
        id: BudgetId(row.try_get("id")?),
        department_id: DepartmentId(row.try_get("department_id")?),
        fiscal_year: row.try_get("fiscal_year")?,
        total_amount: parse_amount("total_amount", &row.try_get::<String, _>("total_amount")?)?,
        current_usage: parse_amount("current_usage", &row.try_get::<String, _>("current_usage")?)?,
        reserved_amount: parse_amount(
            "reserved_amount",
            &row.try_get::<String, _>("reserved_amount")?,
        )?,
        version: parse_u32("version", row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
