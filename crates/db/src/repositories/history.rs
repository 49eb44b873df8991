use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use procura_core::domain::history::{
    ApprovalDecision, ApprovalLevel, DecisionAction, DecisionId,
};
use procura_core::domain::request::RequestId;

use super::{parse_amount, parse_timestamp, HistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlHistoryRepository {
    pool: DbPool,
}

impl SqlHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HistoryRepository for SqlHistoryRepository {
    async fn append(&self, decision: &ApprovalDecision) -> Result<(), RepositoryError> {
        insert_decision(&self.pool, decision).await
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalDecision>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                request_id,
                level,
                approver_id,
                action,
                note,
                request_amount,
                remaining_budget,
                decided_at
             FROM approval_decision
             WHERE request_id = ?
             ORDER BY decided_at ASC, rowid ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decision_from_row).collect()
    }
}

pub(crate) async fn insert_decision<'e, E>(
    executor: E,
    decision: &ApprovalDecision,
) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO approval_decision (
            id,
            request_id,
            level,
            approver_id,
            action,
            note,
            request_amount,
            remaining_budget,
            decided_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&decision.id.0)
    .bind(&decision.request_id.0)
    .bind(decision.level.as_i64())
    .bind(&decision.approver_id)
    .bind(decision.action.as_str())
    .bind(decision.note.as_deref())
    .bind(decision.request_amount.to_string())
    .bind(decision.remaining_budget.to_string())
    .bind(decision.decided_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

fn decision_from_row(row: SqliteRow) -> Result<ApprovalDecision, RepositoryError> {
    let level_raw: i64 = row.try_get("level")?;
    let level = ApprovalLevel::parse(level_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown approval level `{level_raw}`"))
    })?;

    let action_raw = row.try_get::<String, _>("action")?;
    let action = DecisionAction::parse(&action_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown decision action `{action_raw}`"))
    })?;

    Ok(ApprovalDecision {
        id: DecisionId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        level,
        approver_id: row.try_get("approver_id")?,
        action,
        note: row.try_get("note")?,
        request_amount: parse_amount(
            "request_amount",
            &row.try_get::<String, _>("request_amount")?,
        )?,
        remaining_budget: parse_amount(
            "remaining_budget",
            &row.try_get::<String, _>("remaining_budget")?,
        )?,
        decided_at: parse_timestamp("decided_at", row.try_get("decided_at")?)?,
    })
}
