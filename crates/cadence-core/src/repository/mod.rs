use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{
    CompletionRecord, FieldPatch, NewCompletion, Series, SeriesException, SeriesOverride,
    SplitOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

pub mod completions;
pub mod exceptions;
pub mod overrides;
pub mod series;

/// Domain-specific trait for series templates
#[async_trait]
pub trait SeriesRepository {
    async fn get_template(&self, id: Uuid) -> Result<Option<Series>, CoreError>;
    async fn insert_series(&self, series: &Series) -> Result<(), CoreError>;
    /// Replaces the stored rule string; `None` makes the template non-recurring.
    async fn update_rule(&self, id: Uuid, rule: Option<String>) -> Result<Series, CoreError>;
    /// Applies a [`SplitPlan`] as a single transaction.
    async fn split_series(&self, plan: SplitPlan) -> Result<SplitOutcome, CoreError>;
}

/// Domain-specific trait for skipped occurrences
#[async_trait]
pub trait ExceptionRepository {
    async fn list_exceptions(&self, series_id: Uuid) -> Result<Vec<SeriesException>, CoreError>;
    /// Records `date` as skipped and drops any completion stored under
    /// `occurrence_start_at`. Returns whether the exception is new.
    async fn skip_occurrence(
        &self,
        series_id: Uuid,
        date: NaiveDate,
        occurrence_start_at: DateTime<Utc>,
    ) -> Result<bool, CoreError>;
}

/// Domain-specific trait for per-occurrence content overrides
#[async_trait]
pub trait OverrideRepository {
    async fn list_overrides(&self, series_id: Uuid) -> Result<Vec<SeriesOverride>, CoreError>;
    async fn upsert_override(
        &self,
        series_id: Uuid,
        date: NaiveDate,
        patch: &FieldPatch,
    ) -> Result<SeriesOverride, CoreError>;
}

/// Domain-specific trait for task completions
#[async_trait]
pub trait CompletionRepository {
    async fn list_completions(&self, series_id: Uuid) -> Result<Vec<CompletionRecord>, CoreError>;
    /// Inserts or refreshes the completion keyed by `occurrence_start_at`.
    ///
    /// Writes nothing and returns `None` when the date is skipped or the
    /// stored rule differs from `completion.expected_rule`.
    async fn set_completion(
        &self,
        completion: &NewCompletion,
    ) -> Result<Option<CompletionRecord>, CoreError>;
    /// Returns whether a record was removed.
    async fn clear_completion(
        &self,
        series_id: Uuid,
        occurrence_start_at: DateTime<Utc>,
    ) -> Result<bool, CoreError>;
}

/// Everything the recurrence engine needs from storage
pub trait SeriesStore:
    SeriesRepository + ExceptionRepository + OverrideRepository + CompletionRepository + Send + Sync
{
}

/// Writes performed by an edit-this-and-future split.
///
/// Records dated on or after `split_date` are selected and moved inside the
/// split transaction, so nothing written after planning is left behind.
#[derive(Debug, Clone)]
pub struct SplitPlan {
    pub previous_id: Uuid,
    pub split_date: NaiveDate,
    /// The old rule, truncated to end the day before the split
    pub previous_rule: Option<String>,
    pub created: Series,
}

/// SQLite implementation of the repository pattern
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool for internal use across modules
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl SeriesStore for SqliteRepository {}
