use crate::error::CoreError;
use crate::models::{FieldPatch, SeriesOverride};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Stored form of an override; the patch is a JSON document.
#[derive(Debug, FromRow)]
struct OverrideRow {
    series_id: Uuid,
    occurrence_date: NaiveDate,
    modified_fields: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OverrideRow> for SeriesOverride {
    type Error = CoreError;

    fn try_from(row: OverrideRow) -> Result<Self, Self::Error> {
        Ok(SeriesOverride {
            series_id: row.series_id,
            occurrence_date: row.occurrence_date,
            modified_fields: serde_json::from_str(&row.modified_fields)?,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl super::OverrideRepository for SqliteRepository {
    async fn list_overrides(&self, series_id: Uuid) -> Result<Vec<SeriesOverride>, CoreError> {
        let rows: Vec<OverrideRow> = sqlx::query_as(
            "SELECT * FROM series_overrides WHERE series_id = $1 ORDER BY occurrence_date",
        )
        .bind(series_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(SeriesOverride::try_from).collect()
    }

    async fn upsert_override(
        &self,
        series_id: Uuid,
        date: NaiveDate,
        patch: &FieldPatch,
    ) -> Result<SeriesOverride, CoreError> {
        let modified_fields = serde_json::to_string(patch)?;
        let updated_at = Utc::now();

        sqlx::query(
            r#"INSERT INTO series_overrides
                (series_id, occurrence_date, modified_fields, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (series_id, occurrence_date)
            DO UPDATE SET modified_fields = excluded.modified_fields,
                updated_at = excluded.updated_at"#,
        )
        .bind(series_id)
        .bind(date)
        .bind(&modified_fields)
        .bind(updated_at)
        .execute(self.pool())
        .await?;

        Ok(SeriesOverride {
            series_id,
            occurrence_date: date,
            modified_fields: patch.clone(),
            updated_at,
        })
    }
}
