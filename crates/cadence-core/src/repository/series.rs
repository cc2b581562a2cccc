use crate::error::CoreError;
use crate::models::{CompletionRecord, Series, SplitOutcome};
use crate::recurrence::{self, SeriesContext};
use crate::repository::{SplitPlan, SqliteRepository};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::SeriesRepository for SqliteRepository {
    async fn get_template(&self, id: Uuid) -> Result<Option<Series>, CoreError> {
        let series = sqlx::query_as("SELECT * FROM series WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(series)
    }

    async fn insert_series(&self, series: &Series) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        Self::insert_series_in_transaction(&mut tx, series).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_rule(&self, id: Uuid, rule: Option<String>) -> Result<Series, CoreError> {
        let mut tx = self.pool().begin().await?;
        Self::update_rule_in_transaction(&mut tx, id, rule).await?;
        let series = Self::fetch_series_in_transaction(&mut tx, id).await?;
        tx.commit().await?;
        Ok(series)
    }

    async fn split_series(&self, plan: SplitPlan) -> Result<SplitOutcome, CoreError> {
        // The first statement writes, so SQLite holds the write lock from here
        // until commit and the moves below see every record of the old series.
        let mut tx = self.pool().begin().await?;
        let new_id = plan.created.id;

        Self::update_rule_in_transaction(&mut tx, plan.previous_id, plan.previous_rule).await?;
        Self::insert_series_in_transaction(&mut tx, &plan.created).await?;

        let exceptions = sqlx::query(
            r#"UPDATE series_exceptions SET series_id = $1
            WHERE series_id = $2 AND exception_date >= $3"#,
        )
        .bind(new_id)
        .bind(plan.previous_id)
        .bind(plan.split_date)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let overrides = sqlx::query(
            r#"UPDATE series_overrides SET series_id = $1
            WHERE series_id = $2 AND occurrence_date >= $3"#,
        )
        .bind(new_id)
        .bind(plan.previous_id)
        .bind(plan.split_date)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let previous = Self::fetch_series_in_transaction(&mut tx, plan.previous_id).await?;
        let created = Self::fetch_series_in_transaction(&mut tx, new_id).await?;

        // Completions are keyed by start instant, which may change with the
        // new template, so they are rekeyed row by row.
        let completions: Vec<CompletionRecord> =
            sqlx::query_as("SELECT * FROM series_completions WHERE series_id = $1")
                .bind(plan.previous_id)
                .fetch_all(&mut *tx)
                .await?;
        let moves = recurrence::rekey_completions(
            &completions,
            plan.split_date,
            &SeriesContext::from_series(&previous)?,
            &SeriesContext::from_series(&created)?,
        );
        for moved in &moves {
            sqlx::query(
                r#"UPDATE series_completions SET series_id = $1, occurrence_start_at = $2
                WHERE id = $3"#,
            )
            .bind(new_id)
            .bind(moved.occurrence_start_at)
            .bind(moved.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            previous = %previous.id,
            created = %created.id,
            exceptions,
            overrides,
            completions = moves.len(),
            "Series split"
        );
        Ok(SplitOutcome { previous, created })
    }
}

impl SqliteRepository {
    pub(crate) async fn insert_series_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        series: &Series,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO series (id, entity_type, title, description, anchor_at, rule, timezone,
                split_from, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(series.id)
        .bind(series.entity_type)
        .bind(&series.title)
        .bind(&series.description)
        .bind(series.anchor_at)
        .bind(&series.rule)
        .bind(&series.timezone)
        .bind(series.split_from)
        .bind(series.created_at)
        .bind(series.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_rule_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        rule: Option<String>,
    ) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE series SET rule = $1, updated_at = $2 WHERE id = $3")
            .bind(rule)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn fetch_series_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<Series, CoreError> {
        sqlx::query_as("SELECT * FROM series WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }
}
