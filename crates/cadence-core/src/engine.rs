//! The series mutator: every read and write a caller performs on a series.
//!
//! Operations validate first and only then touch storage, so a rejected call
//! leaves no trace. Each write maps onto one atomic [`SeriesStore`] unit.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::calendar;
use crate::codec;
use crate::config::EngineConfig;
use crate::db;
use crate::error::{CoreError, OperationError};
use crate::expander;
use crate::models::{
    CompletionRecord, Confirmation, EndCondition, EntityType, FieldPatch, Frequency, MonthlyType,
    NewCompletion, NewSeries, Occurrence, RecurrenceConfig, Series, SeriesOverride, SplitOutcome,
    UpcomingQuery,
};
use crate::recurrence::{RecurrenceManager, SeriesContext};
use crate::repository::{SeriesStore, SplitPlan, SqliteRepository};
use crate::timezone;

pub struct RecurrenceEngine<R: SeriesStore> {
    store: R,
    config: EngineConfig,
}

impl RecurrenceEngine<SqliteRepository> {
    /// Opens (and migrates) the configured database.
    pub async fn connect(config: EngineConfig) -> Result<Self, CoreError> {
        let pool = db::establish_connection(&config.database).await?;
        Ok(Self::new(SqliteRepository::new(pool), config))
    }
}

impl<R: SeriesStore> RecurrenceEngine<R> {
    pub fn new(store: R, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The configured upcoming window and count.
    pub fn default_upcoming(&self) -> UpcomingQuery {
        self.config.upcoming.into()
    }

    #[tracing::instrument(
        skip(self, data),
        fields(title = %data.title, entity = %data.entity_type)
    )]
    pub async fn create_series(&self, data: NewSeries) -> Result<Series, CoreError> {
        let mut config = data.config;
        if config.timezone.is_empty() {
            config.timezone = self.config.default_timezone.clone();
        }
        let anchor = data.anchor_at.date();
        config.validate(anchor)?;

        let now = Utc::now();
        let series = Series {
            id: Uuid::now_v7(),
            entity_type: data.entity_type,
            title: data.title,
            description: data.description,
            anchor_at: data.anchor_at,
            rule: codec::encode(&config, anchor),
            timezone: config.timezone,
            split_from: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_series(&series).await?;

        tracing::info!(series = %series.id, rule = ?series.rule, "Series created");
        Ok(series)
    }

    /// Swaps the whole recurrence of a series. The timezone stays the one the
    /// series was created with.
    #[tracing::instrument(skip(self, config))]
    pub async fn replace_recurrence(
        &self,
        series_id: Uuid,
        config: RecurrenceConfig,
    ) -> Result<Series, CoreError> {
        let series = self.load_series(series_id).await?;
        config.validate(series.anchor_date())?;
        if config.timezone != series.timezone {
            tracing::debug!(
                requested = %config.timezone,
                kept = %series.timezone,
                "Ignoring timezone change on recurrence replacement"
            );
        }

        let rule = codec::encode(&config, series.anchor_date());
        let updated = self.store.update_rule(series_id, rule).await?;
        tracing::info!(series = %series_id, rule = ?updated.rule, "Recurrence replaced");
        Ok(updated)
    }

    /// Upcoming occurrences counted from today in the series timezone.
    pub async fn get_upcoming(
        &self,
        series_id: Uuid,
        query: UpcomingQuery,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let series = self.load_series(series_id).await?;
        let today = timezone::today_in(timezone::parse_timezone(&series.timezone)?);
        self.upcoming_for(&series, today, query).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_upcoming_as_of(
        &self,
        series_id: Uuid,
        today: NaiveDate,
        query: UpcomingQuery,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let series = self.load_series(series_id).await?;
        self.upcoming_for(&series, today, query).await
    }

    /// Occurrences from the anchor through today in the series timezone.
    pub async fn get_history(&self, series_id: Uuid) -> Result<Vec<Occurrence>, CoreError> {
        let series = self.load_series(series_id).await?;
        let today = timezone::today_in(timezone::parse_timezone(&series.timezone)?);
        self.history_for(&series, today).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_history_as_of(
        &self,
        series_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let series = self.load_series(series_id).await?;
        self.history_for(&series, today).await
    }

    pub async fn list_skipped(&self, series_id: Uuid) -> Result<Vec<NaiveDate>, CoreError> {
        self.load_series(series_id).await?;
        let exceptions = self.store.list_exceptions(series_id).await?;
        Ok(exceptions.into_iter().map(|e| e.exception_date).collect())
    }

    /// Removes one occurrence from its series. Skipping twice is a no-op;
    /// returns whether this call did the skipping.
    #[tracing::instrument(skip(self))]
    pub async fn skip(
        &self,
        series_id: Uuid,
        date: NaiveDate,
        confirmation: Confirmation,
    ) -> Result<bool, CoreError> {
        if confirmation != Confirmation::Confirmed {
            return Err(OperationError::ConfirmationRequired.into());
        }
        let series = self.load_series(series_id).await?;
        ensure_occurrence(&series, date)?;

        let context = SeriesContext::from_series(&series)?;
        let skipped = self
            .store
            .skip_occurrence(series_id, date, context.start_instant(date))
            .await?;

        tracing::info!(series = %series_id, %date, new = skipped, "Occurrence skipped");
        Ok(skipped)
    }

    /// Toggles the completion of one task occurrence.
    ///
    /// `was_completed` is the state the caller saw: `true` clears the record,
    /// `false` writes it. Returns the record now stored, if any.
    #[tracing::instrument(skip(self))]
    pub async fn complete(
        &self,
        series_id: Uuid,
        occurrence_start_at: DateTime<Utc>,
        was_completed: bool,
        completed_by: &str,
    ) -> Result<Option<CompletionRecord>, CoreError> {
        let series = self.load_series(series_id).await?;
        if series.entity_type != EntityType::Task {
            return Err(OperationError::NotATask.into());
        }

        if was_completed {
            let removed = self
                .store
                .clear_completion(series_id, occurrence_start_at)
                .await?;
            tracing::info!(
                series = %series_id,
                %occurrence_start_at,
                removed,
                "Completion cleared"
            );
            return Ok(None);
        }

        let context = SeriesContext::from_series(&series)?;
        let date = timezone::local_date(occurrence_start_at, context.tz);
        ensure_occurrence(&series, date)?;
        if context.start_instant(date) != occurrence_start_at {
            return Err(OperationError::NotAnOccurrence(date).into());
        }

        // Skip list and rule are checked by the same statement that writes.
        let completion = NewCompletion {
            series_id,
            occurrence_date: date,
            occurrence_start_at,
            completed_by: completed_by.to_string(),
            expected_rule: series.rule.clone(),
        };
        let record = self
            .store
            .set_completion(&completion)
            .await?
            .ok_or(OperationError::NotAnOccurrence(date))?;
        tracing::info!(series = %series_id, %occurrence_start_at, "Occurrence completed");
        Ok(Some(record))
    }

    /// Changes the content of a single occurrence; the series is untouched.
    #[tracing::instrument(skip(self, patch))]
    pub async fn edit_one(
        &self,
        series_id: Uuid,
        date: NaiveDate,
        patch: FieldPatch,
    ) -> Result<SeriesOverride, CoreError> {
        let series = self.load_series(series_id).await?;
        ensure_occurrence(&series, date)?;

        let stored = self.store.upsert_override(series_id, date, &patch).await?;
        tracing::info!(series = %series_id, %date, "Occurrence overridden");
        Ok(stored)
    }

    /// Ends a task series the day before `date` and continues it, patched,
    /// as a new series anchored on `date`.
    #[tracing::instrument(skip(self, patch))]
    pub async fn edit_this_and_future(
        &self,
        series_id: Uuid,
        date: NaiveDate,
        patch: FieldPatch,
    ) -> Result<SplitOutcome, CoreError> {
        let series = self.load_series(series_id).await?;
        if series.entity_type != EntityType::Task {
            return Err(OperationError::NotATask.into());
        }

        let plan = plan_split(&series, date, &patch)?;
        self.store.split_series(plan).await
    }

    async fn load_series(&self, series_id: Uuid) -> Result<Series, CoreError> {
        self.store
            .get_template(series_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(series_id.to_string()))
    }

    async fn manager_for(&self, series: &Series) -> Result<RecurrenceManager, CoreError> {
        let exceptions = self.store.list_exceptions(series.id).await?;
        let overrides = self.store.list_overrides(series.id).await?;
        let completions = if series.is_task() {
            self.store.list_completions(series.id).await?
        } else {
            Vec::new()
        };
        RecurrenceManager::new(series, exceptions, overrides, completions)
    }

    async fn upcoming_for(
        &self,
        series: &Series,
        today: NaiveDate,
        query: UpcomingQuery,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let manager = self
            .manager_for(series)
            .await?
            .with_hard_cap(self.config.expansion_hard_cap);
        let occurrences = manager.upcoming(today, query);
        tracing::debug!(
            series = %series.id,
            %today,
            count = occurrences.len(),
            "Upcoming computed"
        );
        Ok(occurrences)
    }

    async fn history_for(
        &self,
        series: &Series,
        today: NaiveDate,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let manager = self
            .manager_for(series)
            .await?
            .with_hard_cap(self.config.history_hard_cap);
        Ok(manager.history(today))
    }
}

fn ensure_occurrence(series: &Series, date: NaiveDate) -> Result<(), CoreError> {
    if expander::is_occurrence(series.anchor_date(), &series.recurrence(), date) {
        Ok(())
    } else {
        Err(OperationError::NotAnOccurrence(date).into())
    }
}

/// Validates an edit-this-and-future split and builds both templates.
///
/// Moving the records of the old series is left to the store, which does it
/// inside the split transaction.
pub(crate) fn plan_split(
    series: &Series,
    date: NaiveDate,
    patch: &FieldPatch,
) -> Result<SplitPlan, CoreError> {
    let anchor = series.anchor_date();
    let config = series.recurrence();
    if !config.is_recurring() {
        return Err(OperationError::NotRecurring.into());
    }
    if date <= anchor {
        return Err(OperationError::SplitAtOrBeforeAnchor { date, anchor }.into());
    }
    if !expander::is_occurrence(anchor, &config, date) {
        return Err(OperationError::NotAnOccurrence(date).into());
    }

    let previous_config = config
        .clone()
        .with_end(EndCondition::Date(date - Duration::days(1)));

    let mut next_config = config.clone();
    if let EndCondition::Count(total) = config.end {
        let before = expander::count_before(anchor, &config, date);
        next_config.end = EndCondition::Count(total.saturating_sub(before).max(1));
    }
    if config.frequency == Frequency::Monthly && config.monthly_type == MonthlyType::Weekday {
        next_config.weekdays = [calendar::weekday_code(date)].into_iter().collect();
    }
    next_config.validate(date)?;

    let now = Utc::now();
    let created = Series {
        id: Uuid::now_v7(),
        entity_type: series.entity_type,
        title: patch.title.clone().unwrap_or_else(|| series.title.clone()),
        description: match &patch.description {
            Some(description) => description.clone(),
            None => series.description.clone(),
        },
        anchor_at: date.and_time(patch.start_time.unwrap_or_else(|| series.start_time())),
        rule: codec::encode(&next_config, date),
        timezone: series.timezone.clone(),
        split_from: Some(series.id),
        created_at: now,
        updated_at: now,
    };

    Ok(SplitPlan {
        previous_id: series.id,
        split_date: date,
        previous_rule: codec::encode(&previous_config, anchor),
        created,
    })
}
