use sqlx::Row;

use procura_core::domain::request::RequestNumber;
use procura_core::numbering::RequestNumberFormat;

use super::{RepositoryError, RequestNumberGenerator};
use crate::DbPool;

/// Sequence-backed request number generator. The per-year counter is
/// advanced with a single upsert, so concurrent submissions can never be
/// issued the same number.
pub struct SqlRequestNumbers {
    pool: DbPool,
    format: RequestNumberFormat,
}

impl SqlRequestNumbers {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, format: RequestNumberFormat::default() }
    }

    pub fn with_format(mut self, format: RequestNumberFormat) -> Self {
        self.format = format;
        self
    }
}

#[async_trait::async_trait]
impl RequestNumberGenerator for SqlRequestNumbers {
    async fn next_request_number(
        &self,
        fiscal_year: i32,
    ) -> Result<RequestNumber, RepositoryError> {
        let row = sqlx::query(
            "INSERT INTO request_number_seq (fiscal_year, next_value)
             VALUES (?, 2)
             ON CONFLICT(fiscal_year) DO UPDATE SET next_value = next_value + 1
             RETURNING next_value",
        )
        .bind(fiscal_year)
        .fetch_one(&self.pool)
        .await?;

        let next_value: i64 = row.try_get("next_value")?;
        let allocated = u64::try_from(next_value - 1).map_err(|_| {
            RepositoryError::Decode(format!(
                "request number sequence for {fiscal_year} is corrupt: {next_value}"
            ))
        })?;

        Ok(self.format.render(fiscal_year, allocated))
    }
}

#[cfg(test)]
mod tests {
    use procura_core::numbering::RequestNumberFormat;

    use super::SqlRequestNumbers;
    use crate::migrations;
    use crate::repositories::RequestNumberGenerator;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn numbers_are_sequential_within_a_fiscal_year() {
        let pool = setup_pool().await;
        let numbers = SqlRequestNumbers::new(pool.clone());

        let first = numbers.next_request_number(2026).await.expect("first");
        let second = numbers.next_request_number(2026).await.expect("second");
        let third = numbers.next_request_number(2026).await.expect("third");

        assert_eq!(first.0, "PR-2026-00001");
        assert_eq!(second.0, "PR-2026-00002");
        assert_eq!(third.0, "PR-2026-00003");

        pool.close().await;
    }

    #[tokio::test]
    async fn each_fiscal_year_counts_independently() {
        let pool = setup_pool().await;
        let numbers = SqlRequestNumbers::new(pool.clone());

        numbers.next_request_number(2026).await.expect("2026 first");
        let next_year = numbers.next_request_number(2027).await.expect("2027 first");

        assert_eq!(next_year.0, "PR-2027-00001");

        pool.close().await;
    }

    #[tokio::test]
    async fn custom_prefixes_flow_through_to_the_rendered_number() {
        let pool = setup_pool().await;
        let numbers =
            SqlRequestNumbers::new(pool.clone()).with_format(RequestNumberFormat::new("REQ"));

        let number = numbers.next_request_number(2026).await.expect("number");
        assert_eq!(number.0, "REQ-2026-00001");

        pool.close().await;
    }
}
