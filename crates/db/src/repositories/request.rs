use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use procura_core::domain::budget::DepartmentId;
use procura_core::domain::request::{
    PurchaseRequest, RequestId, RequestItem, RequestNumber, RequestStatus,
};

use super::{
    parse_amount, parse_optional_timestamp, parse_timestamp, parse_u32, RepositoryError,
    RequestRepository,
};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, request_id: &RequestId) -> Result<Vec<RequestItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT name, quantity, unit_price
             FROM request_item
             WHERE request_id = ?
             ORDER BY position ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(item_from_row).collect()
    }
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn create_draft(&self, request: &PurchaseRequest) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        insert_request_row(&mut *tx, request).await?;
        insert_request_items(&mut *tx, request).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<PurchaseRequest>, RepositoryError> {
        let row = sqlx::query(&format!("{REQUEST_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut request = request_from_row(row)?;
        request.items = self.load_items(id).await?;
        Ok(Some(request))
    }

    async fn list_for_department(
        &self,
        department_id: &DepartmentId,
        fiscal_year: i32,
    ) -> Result<Vec<PurchaseRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{REQUEST_COLUMNS}
             WHERE department_id = ? AND fiscal_year = ?
             ORDER BY created_at ASC"
        ))
        .bind(&department_id.0)
        .bind(fiscal_year)
        .fetch_all(&self.pool)
        .await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            let mut request = request_from_row(row)?;
            request.items = self.load_items(&request.id).await?;
            requests.push(request);
        }

        Ok(requests)
    }
}

const REQUEST_COLUMNS: &str = "SELECT
    id,
    request_number,
    requester_id,
    department_id,
    fiscal_year,
    total_amount,
    status,
    submitted_at,
    manager_approver_id,
    manager_approved_at,
    finance_approver_id,
    finance_approved_at,
    rejected_by_id,
    rejected_at,
    rejection_reason,
    version,
    created_at,
    updated_at
 FROM purchase_request";

pub(crate) async fn insert_request_row(
    conn: &mut SqliteConnection,
    request: &PurchaseRequest,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO purchase_request (
            id,
            request_number,
            requester_id,
            department_id,
            fiscal_year,
            total_amount,
            status,
            submitted_at,
            manager_approver_id,
            manager_approved_at,
            finance_approver_id,
            finance_approved_at,
            rejected_by_id,
            rejected_at,
            rejection_reason,
            version,
            created_at,
            updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&request.id.0)
    .bind(request.request_number.as_ref().map(|number| number.0.as_str()))
    .bind(&request.requester_id)
    .bind(&request.department_id.0)
    .bind(request.fiscal_year)
    .bind(request.total_amount.to_string())
    .bind(request.status.as_str())
    .bind(request.submitted_at.map(|value| value.to_rfc3339()))
    .bind(request.manager_approver_id.as_deref())
    .bind(request.manager_approved_at.map(|value| value.to_rfc3339()))
    .bind(request.finance_approver_id.as_deref())
    .bind(request.finance_approved_at.map(|value| value.to_rfc3339()))
    .bind(request.rejected_by_id.as_deref())
    .bind(request.rejected_at.map(|value| value.to_rfc3339()))
    .bind(request.rejection_reason.as_deref())
    .bind(i64::from(request.version))
    .bind(request.created_at.to_rfc3339())
    .bind(request.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Compare-and-swap write of a purchase-request row. Returns `false` when
/// the stored version no longer matches `expected_version`.
pub(crate) async fn update_request_row<'e, E>(
    executor: E,
    request: &PurchaseRequest,
    expected_version: u32,
) -> Result<bool, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        "UPDATE purchase_request SET
            request_number = ?,
            total_amount = ?,
            status = ?,
            submitted_at = ?,
            manager_approver_id = ?,
            manager_approved_at = ?,
            finance_approver_id = ?,
            finance_approved_at = ?,
            rejected_by_id = ?,
            rejected_at = ?,
            rejection_reason = ?,
            version = ?,
            updated_at = ?
         WHERE id = ? AND version = ?",
    )
    .bind(request.request_number.as_ref().map(|number| number.0.as_str()))
    .bind(request.total_amount.to_string())
    .bind(request.status.as_str())
    .bind(request.submitted_at.map(|value| value.to_rfc3339()))
    .bind(request.manager_approver_id.as_deref())
    .bind(request.manager_approved_at.map(|value| value.to_rfc3339()))
    .bind(request.finance_approver_id.as_deref())
    .bind(request.finance_approved_at.map(|value| value.to_rfc3339()))
    .bind(request.rejected_by_id.as_deref())
    .bind(request.rejected_at.map(|value| value.to_rfc3339()))
    .bind(request.rejection_reason.as_deref())
    .bind(i64::from(request.version))
    .bind(request.updated_at.to_rfc3339())
    .bind(&request.id.0)
    .bind(i64::from(expected_version))
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn insert_request_items(
    conn: &mut SqliteConnection,
    request: &PurchaseRequest,
) -> Result<(), RepositoryError> {
    for (position, item) in request.items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO request_item (id, request_id, position, name, quantity, unit_price)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&request.id.0)
        .bind(position as i64)
        .bind(&item.name)
        .bind(i64::from(item.quantity))
        .bind(item.unit_price.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub(crate) async fn replace_request_items(
    conn: &mut SqliteConnection,
    request: &PurchaseRequest,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM request_item WHERE request_id = ?")
        .bind(&request.id.0)
        .execute(&mut *conn)
        .await?;

    insert_request_items(conn, request).await
}

fn item_from_row(row: SqliteRow) -> Result<RequestItem, RepositoryError> {
    let quantity: i64 = row.try_get("quantity")?;

    Ok(RequestItem {
        name: row.try_get("name")?,
        quantity: parse_u32("quantity", quantity)?,
        unit_price: parse_amount("unit_price", &row.try_get::<String, _>("unit_price")?)?,
    })
}

fn request_from_row(row: SqliteRow) -> Result<PurchaseRequest, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown purchase request status `{status_raw}`"))
    })?;

    Ok(PurchaseRequest {
        id: RequestId(row.try_get("id")?),
        request_number: row.try_get::<Option<String>, _>("request_number")?.map(RequestNumber),
        requester_id: row.try_get("requester_id")?,
        department_id: DepartmentId(row.try_get("department_id")?),
        fiscal_year: row.try_get("fiscal_year")?,
        items: Vec::new(),
        total_amount: parse_amount("total_amount", &row.try_get::<String, _>("total_amount")?)?,
        status,
        submitted_at: parse_optional_timestamp("submitted_at", row.try_get("submitted_at")?)?,
        manager_approver_id: row.try_get("manager_approver_id")?,
        manager_approved_at: parse_optional_timestamp(
            "manager_approved_at",
            row.try_get("manager_approved_at")?,
        )?,
        finance_approver_id: row.try_get("finance_approver_id")?,
        finance_approved_at: parse_optional_timestamp(
            "finance_approved_at",
            row.try_get("finance_approved_at")?,
        )?,
        rejected_by_id: row.try_get("rejected_by_id")?,
        rejected_at: parse_optional_timestamp("rejected_at", row.try_get("rejected_at")?)?,
        rejection_reason: row.try_get("rejection_reason")?,
        version: parse_u32("version", row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use procura_core::domain::budget::DepartmentId;
    use procura_core::domain::request::{PurchaseRequest, RequestItem, RequestStatus};

    use super::SqlRequestRepository;
    use crate::migrations;
    use crate::repositories::RequestRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_draft(department: &str) -> PurchaseRequest {
        PurchaseRequest::draft(
            "u-requester",
            DepartmentId(department.to_string()),
            2026,
            vec![
                RequestItem {
                    name: "laptop".to_string(),
                    quantity: 2,
                    unit_price: Decimal::new(1_500_00, 2),
                },
                RequestItem {
                    name: "monitor".to_string(),
                    quantity: 4,
                    unit_price: Decimal::new(350_00, 2),
                },
            ],
        )
    }

    #[tokio::test]
    async fn create_draft_round_trips_with_items_in_order() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());

        let draft = sample_draft("engineering");
        repo.create_draft(&draft).await.expect("create draft");

        let found = repo.find_by_id(&draft.id).await.expect("find").expect("exists");
        assert_eq!(found, draft);
        assert_eq!(found.items.len(), 2);
        assert_eq!(found.items[0].name, "laptop");
        assert_eq!(found.items[1].name, "monitor");
        assert_eq!(found.status, RequestStatus::Draft);

        pool.close().await;
    }

    #[tokio::test]
    async fn find_by_id_returns_none_for_unknown_request() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());

        let missing = repo
            .find_by_id(&procura_core::domain::request::RequestId("nope".to_string()))
            .await
            .expect("find");
        assert!(missing.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn list_for_department_filters_by_department_and_year() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());

        let eng_a = sample_draft("engineering");
        let eng_b = sample_draft("engineering");
        let marketing = sample_draft("marketing");

        repo.create_draft(&eng_a).await.expect("create a");
        repo.create_draft(&eng_b).await.expect("create b");
        repo.create_draft(&marketing).await.expect("create marketing");

        let engineering = repo
            .list_for_department(&DepartmentId("engineering".to_string()), 2026)
            .await
            .expect("list");
        assert_eq!(engineering.len(), 2);

        let other_year = repo
            .list_for_department(&DepartmentId("engineering".to_string()), 2027)
            .await
            .expect("list");
        assert!(other_year.is_empty());

        pool.close().await;
    }
}
