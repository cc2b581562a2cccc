use crate::error::CoreError;
use crate::models::{CompletionRecord, NewCompletion};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
impl super::CompletionRepository for SqliteRepository {
    async fn list_completions(&self, series_id: Uuid) -> Result<Vec<CompletionRecord>, CoreError> {
        let completions = sqlx::query_as(
            "SELECT * FROM series_completions WHERE series_id = $1 ORDER BY occurrence_start_at",
        )
        .bind(series_id)
        .fetch_all(self.pool())
        .await?;
        Ok(completions)
    }

    async fn set_completion(
        &self,
        completion: &NewCompletion,
    ) -> Result<Option<CompletionRecord>, CoreError> {
        let mut tx = self.pool().begin().await?;

        // One statement, so a concurrent skip or rule change either lands
        // before it and blocks the write, or after it and sees the row.
        // Last write wins; the unique key keeps one row per occurrence.
        let written = sqlx::query(
            r#"INSERT INTO series_completions
                (id, series_id, occurrence_start_at, completed_at, completed_by)
            SELECT $1, $2, $3, $4, $5
            WHERE NOT EXISTS (
                SELECT 1 FROM series_exceptions WHERE series_id = $6 AND exception_date = $7
            )
            AND EXISTS (SELECT 1 FROM series WHERE id = $8 AND rule IS $9)
            ON CONFLICT (series_id, occurrence_start_at)
            DO UPDATE SET completed_at = excluded.completed_at,
                completed_by = excluded.completed_by"#,
        )
        .bind(Uuid::now_v7())
        .bind(completion.series_id)
        .bind(completion.occurrence_start_at)
        .bind(Utc::now())
        .bind(&completion.completed_by)
        .bind(completion.series_id)
        .bind(completion.occurrence_date)
        .bind(completion.series_id)
        .bind(&completion.expected_rule)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if written == 0 {
            tracing::debug!(
                series_id = %completion.series_id,
                date = %completion.occurrence_date,
                "Completion refused: occurrence skipped or rule changed"
            );
            return Ok(None);
        }

        let record: CompletionRecord = sqlx::query_as(
            "SELECT * FROM series_completions WHERE series_id = $1 AND occurrence_start_at = $2",
        )
        .bind(completion.series_id)
        .bind(completion.occurrence_start_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(record))
    }

    async fn clear_completion(
        &self,
        series_id: Uuid,
        occurrence_start_at: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "DELETE FROM series_completions WHERE series_id = $1 AND occurrence_start_at = $2",
        )
        .bind(series_id)
        .bind(occurrence_start_at)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
