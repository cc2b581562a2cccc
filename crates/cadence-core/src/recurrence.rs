use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::CoreError;
use crate::expander::{self, OccurrenceIter, Window};
use crate::models::{
    CompletionRecord, EntityType, FieldPatch, Occurrence, RecurrenceConfig, Series,
    SeriesException, SeriesOverride, UpcomingQuery,
};
use crate::timezone;

/// The parts of a series template an occurrence is built from.
#[derive(Debug, Clone)]
pub struct SeriesContext {
    pub series_id: Uuid,
    pub entity_type: EntityType,
    pub title: String,
    pub description: Option<String>,
    pub anchor_date: NaiveDate,
    pub start_time: NaiveTime,
    pub tz: Tz,
}

impl SeriesContext {
    pub fn from_series(series: &Series) -> Result<Self, CoreError> {
        Ok(Self {
            series_id: series.id,
            entity_type: series.entity_type,
            title: series.title.clone(),
            description: series.description.clone(),
            anchor_date: series.anchor_date(),
            start_time: series.start_time(),
            tz: timezone::parse_timezone(&series.timezone)?,
        })
    }

    /// Scheduled start instant of the occurrence on `date`.
    pub fn start_instant(&self, date: NaiveDate) -> DateTime<Utc> {
        timezone::resolve_local(date.and_time(self.start_time), self.tz)
    }
}

/// Options for the "what should I still do" view.
#[derive(Debug, Clone, Copy)]
pub struct UpcomingOptions {
    pub entity_type: EntityType,
    pub max_count: usize,
}

/// Merges raw expander dates with the persisted records of a series.
///
/// Exception dates are dropped; override patches are applied; task
/// occurrences get the completion stored under their start instant.
/// Chronological order of `raw_dates` is preserved.
pub fn materialize(
    raw_dates: &[NaiveDate],
    context: &SeriesContext,
    exceptions: &[SeriesException],
    overrides: &[SeriesOverride],
    completions: &[CompletionRecord],
) -> Vec<Occurrence> {
    let skipped: HashSet<NaiveDate> = exceptions.iter().map(|e| e.exception_date).collect();
    let patches: HashMap<NaiveDate, &FieldPatch> = overrides
        .iter()
        .map(|o| (o.occurrence_date, &o.modified_fields))
        .collect();
    let done: HashMap<DateTime<Utc>, &CompletionRecord> = completions
        .iter()
        .map(|c| (c.occurrence_start_at, c))
        .collect();

    raw_dates
        .iter()
        .filter(|date| !skipped.contains(date))
        .map(|&date| {
            let start = context.start_instant(date);
            let patch = patches.get(&date).copied();
            let completion = match context.entity_type {
                EntityType::Task => done.get(&start).copied(),
                EntityType::Event => None,
            };

            let effective_start_at = patch
                .and_then(|p| p.start_time)
                .map(|time| timezone::resolve_local(date.and_time(time), context.tz))
                .unwrap_or(start);

            Occurrence {
                series_id: context.series_id,
                occurrence_date: date,
                occurrence_start_at: start,
                effective_start_at,
                title: patch
                    .and_then(|p| p.title.clone())
                    .unwrap_or_else(|| context.title.clone()),
                description: match patch.and_then(|p| p.description.clone()) {
                    Some(description) => description,
                    None => context.description.clone(),
                },
                is_exception: false,
                is_override: patch.is_some(),
                is_completed: completion.is_some(),
                completed_at: completion.map(|c| c.completed_at),
                completed_by: completion.map(|c| c.completed_by.clone()),
            }
        })
        .collect()
}

/// Filters a materialized list down to what is still to do.
///
/// Task occurrences that are already completed are removed; the result is
/// truncated to `max_count`.
pub fn upcoming(occurrences: Vec<Occurrence>, options: UpcomingOptions) -> Vec<Occurrence> {
    occurrences
        .into_iter()
        .filter(|o| !o.is_exception)
        .filter(|o| options.entity_type != EntityType::Task || !o.is_completed)
        .take(options.max_count)
        .collect()
}

/// A completion that follows its occurrence into a split-off series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionMove {
    pub id: Uuid,
    /// Key under the new series; differs from the old key when the start time moved
    pub occurrence_start_at: DateTime<Utc>,
}

/// Completions of `previous` dated on or after `split_date`, rekeyed to the
/// start instants of `next`.
pub fn rekey_completions(
    completions: &[CompletionRecord],
    split_date: NaiveDate,
    previous: &SeriesContext,
    next: &SeriesContext,
) -> Vec<CompletionMove> {
    completions
        .iter()
        .filter_map(|c| {
            let occurrence = timezone::local_date(c.occurrence_start_at, previous.tz);
            (occurrence >= split_date).then(|| CompletionMove {
                id: c.id,
                occurrence_start_at: next.start_instant(occurrence),
            })
        })
        .collect()
}

/// RecurrenceManager: occurrence views for one series.
///
/// Holds a template, its decoded rule and the persisted records, and answers
/// window, upcoming and history queries with pure computations.
#[derive(Debug, Clone)]
pub struct RecurrenceManager {
    context: SeriesContext,
    config: RecurrenceConfig,
    exceptions: Vec<SeriesException>,
    overrides: Vec<SeriesOverride>,
    completions: Vec<CompletionRecord>,
    hard_cap: usize,
}

impl RecurrenceManager {
    /// Creates a new RecurrenceManager from series data.
    ///
    /// Fails only when the stored timezone is not a valid IANA name.
    pub fn new(
        series: &Series,
        exceptions: Vec<SeriesException>,
        overrides: Vec<SeriesOverride>,
        completions: Vec<CompletionRecord>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            context: SeriesContext::from_series(series)?,
            config: series.recurrence(),
            exceptions,
            overrides,
            completions,
            hard_cap: expander::DEFAULT_HARD_CAP,
        })
    }

    pub fn with_hard_cap(mut self, hard_cap: usize) -> Self {
        self.hard_cap = hard_cap;
        self
    }

    pub fn context(&self) -> &SeriesContext {
        &self.context
    }

    pub fn config(&self) -> &RecurrenceConfig {
        &self.config
    }

    /// Raw rule dates inside `window`, exceptions not applied.
    pub fn raw_dates(&self, window: Window) -> Vec<NaiveDate> {
        expander::expand(self.context.anchor_date, &self.config, window, self.hard_cap)
    }

    /// Materialized occurrences inside `window`.
    pub fn occurrences_between(&self, window: Window) -> Vec<Occurrence> {
        materialize(
            &self.raw_dates(window),
            &self.context,
            &self.exceptions,
            &self.overrides,
            &self.completions,
        )
    }

    /// Occurrences from `today` through `query.months_ahead` months, minus
    /// completed task occurrences, at most `query.max_count`.
    pub fn upcoming(&self, today: NaiveDate, query: UpcomingQuery) -> Vec<Occurrence> {
        let window = Window::months_from(today, query.months_ahead);
        upcoming(
            self.occurrences_between(window),
            UpcomingOptions {
                entity_type: self.context.entity_type,
                max_count: query.max_count,
            },
        )
    }

    /// Occurrences from the anchor through `today`, completed ones included.
    ///
    /// When the series has more than the hard cap of dates, the most recent
    /// ones are kept.
    pub fn history(&self, today: NaiveDate) -> Vec<Occurrence> {
        let anchor = self.context.anchor_date;
        let dates = expander::expand_latest(
            anchor,
            &self.config,
            Window::new(anchor, today),
            self.hard_cap,
        );
        materialize(
            &dates,
            &self.context,
            &self.exceptions,
            &self.overrides,
            &self.completions,
        )
    }

    /// First non-skipped occurrence strictly after `after`.
    pub fn next_occurrence_after(&self, after: NaiveDate) -> Option<Occurrence> {
        let skipped: HashSet<NaiveDate> =
            self.exceptions.iter().map(|e| e.exception_date).collect();
        let date = OccurrenceIter::new(self.context.anchor_date, &self.config)
            .seek(after)
            .take(self.hard_cap)
            .find(|d| *d > after && !skipped.contains(d))?;
        materialize(&[date], &self.context, &[], &self.overrides, &self.completions)
            .into_iter()
            .next()
    }
}
