use crate::error::CoreError;
use crate::models::SeriesException;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

#[async_trait]
impl super::ExceptionRepository for SqliteRepository {
    async fn list_exceptions(&self, series_id: Uuid) -> Result<Vec<SeriesException>, CoreError> {
        let exceptions = sqlx::query_as(
            "SELECT * FROM series_exceptions WHERE series_id = $1 ORDER BY exception_date",
        )
        .bind(series_id)
        .fetch_all(self.pool())
        .await?;
        Ok(exceptions)
    }

    async fn skip_occurrence(
        &self,
        series_id: Uuid,
        date: NaiveDate,
        occurrence_start_at: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query(
            r#"INSERT INTO series_exceptions (series_id, exception_date, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (series_id, exception_date) DO NOTHING"#,
        )
        .bind(series_id)
        .bind(date)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        // A skipped occurrence cannot stay completed.
        sqlx::query(
            "DELETE FROM series_completions WHERE series_id = $1 AND occurrence_start_at = $2",
        )
        .bind(series_id)
        .bind(occurrence_start_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }
}
