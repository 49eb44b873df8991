use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "budget",
        "purchase_request",
        "request_item",
        "approval_decision",
        "request_number_seq",
        "idx_purchase_request_number",
        "idx_purchase_request_department",
        "idx_purchase_request_status",
        "idx_request_item_request_id",
        "idx_approval_decision_request_id",
        "idx_approval_decision_decided_at",
    ];

    #[tokio::test]
    async fn migrations_create_every_managed_schema_object() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for object in MANAGED_SCHEMA_OBJECTS {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master
                 WHERE type IN ('table', 'index') AND name = ?",
            )
            .bind(object)
            .fetch_one(&pool)
            .await
            .expect("query sqlite_master")
            .get::<i64, _>("count");

            assert_eq!(count, 1, "schema object `{object}` was not created");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run");
    }
}
