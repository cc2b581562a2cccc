use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ValidationError;

// ============================================================================
// Recurrence configuration
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Not recurring. Never stored together with a rule string.
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// Accepted from editors but stored as `DAILY`; see `codec::encode`.
    Custom,
}

impl Frequency {
    pub fn is_recurring(self) -> bool {
        self != Frequency::None
    }
}

/// Two-letter weekday code, ordered Monday first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeekdayCode {
    Mo,
    Tu,
    We,
    Th,
    Fr,
    Sa,
    Su,
}

impl WeekdayCode {
    pub const ALL: [WeekdayCode; 7] = [
        WeekdayCode::Mo,
        WeekdayCode::Tu,
        WeekdayCode::We,
        WeekdayCode::Th,
        WeekdayCode::Fr,
        WeekdayCode::Sa,
        WeekdayCode::Su,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WeekdayCode::Mo => "MO",
            WeekdayCode::Tu => "TU",
            WeekdayCode::We => "WE",
            WeekdayCode::Th => "TH",
            WeekdayCode::Fr => "FR",
            WeekdayCode::Sa => "SA",
            WeekdayCode::Su => "SU",
        }
    }

    pub fn to_chrono(self) -> Weekday {
        match self {
            WeekdayCode::Mo => Weekday::Mon,
            WeekdayCode::Tu => Weekday::Tue,
            WeekdayCode::We => Weekday::Wed,
            WeekdayCode::Th => Weekday::Thu,
            WeekdayCode::Fr => Weekday::Fri,
            WeekdayCode::Sa => Weekday::Sat,
            WeekdayCode::Su => Weekday::Sun,
        }
    }

    /// Days since Monday (MO = 0 .. SU = 6).
    pub fn days_from_monday(self) -> u32 {
        self.to_chrono().num_days_from_monday()
    }
}

impl From<Weekday> for WeekdayCode {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => WeekdayCode::Mo,
            Weekday::Tue => WeekdayCode::Tu,
            Weekday::Wed => WeekdayCode::We,
            Weekday::Thu => WeekdayCode::Th,
            Weekday::Fri => WeekdayCode::Fr,
            Weekday::Sat => WeekdayCode::Sa,
            Weekday::Sun => WeekdayCode::Su,
        }
    }
}

impl std::fmt::Display for WeekdayCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid weekday code: {0}")]
pub struct ParseWeekdayCodeError(String);

impl FromStr for WeekdayCode {
    type Err = ParseWeekdayCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MO" => Ok(WeekdayCode::Mo),
            "TU" => Ok(WeekdayCode::Tu),
            "WE" => Ok(WeekdayCode::We),
            "TH" => Ok(WeekdayCode::Th),
            "FR" => Ok(WeekdayCode::Fr),
            "SA" => Ok(WeekdayCode::Sa),
            "SU" => Ok(WeekdayCode::Su),
            _ => Err(ParseWeekdayCodeError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MonthlyType {
    /// Repeat on the anchor's day of month.
    #[default]
    Day,
    /// Repeat on the anchor's "Nth weekday of the month".
    Weekday,
}

/// When a series stops producing occurrences.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum EndCondition {
    #[default]
    Never,
    /// Inclusive last civil date.
    Date(NaiveDate),
    /// Total occurrences, the first one included.
    Count(u32),
}

/// The recurrence rule owned by a series template. Replaced wholesale on edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceConfig {
    pub frequency: Frequency,
    pub interval: u32,
    /// Active days for weekly rules; the single anchor weekday for monthly/weekday rules.
    pub weekdays: BTreeSet<WeekdayCode>,
    pub monthly_type: MonthlyType,
    pub end: EndCondition,
    /// IANA zone whose civil calendar all occurrence arithmetic uses.
    pub timezone: String,
}

impl RecurrenceConfig {
    /// A non-recurring config in the given zone.
    pub fn default_for(timezone: impl Into<String>) -> Self {
        Self {
            frequency: Frequency::None,
            interval: 1,
            weekdays: BTreeSet::new(),
            monthly_type: MonthlyType::Day,
            end: EndCondition::Never,
            timezone: timezone.into(),
        }
    }

    pub fn daily(timezone: impl Into<String>) -> Self {
        Self {
            frequency: Frequency::Daily,
            ..Self::default_for(timezone)
        }
    }

    pub fn weekly(
        timezone: impl Into<String>,
        weekdays: impl IntoIterator<Item = WeekdayCode>,
    ) -> Self {
        Self {
            frequency: Frequency::Weekly,
            weekdays: weekdays.into_iter().collect(),
            ..Self::default_for(timezone)
        }
    }

    pub fn monthly_by_day(timezone: impl Into<String>) -> Self {
        Self {
            frequency: Frequency::Monthly,
            monthly_type: MonthlyType::Day,
            ..Self::default_for(timezone)
        }
    }

    /// Monthly on the anchor's positional weekday, e.g. "2nd Tuesday".
    pub fn monthly_by_weekday(timezone: impl Into<String>, anchor: NaiveDate) -> Self {
        Self {
            frequency: Frequency::Monthly,
            monthly_type: MonthlyType::Weekday,
            weekdays: BTreeSet::from([crate::calendar::weekday_code(anchor)]),
            ..Self::default_for(timezone)
        }
    }

    pub fn yearly(timezone: impl Into<String>) -> Self {
        Self {
            frequency: Frequency::Yearly,
            ..Self::default_for(timezone)
        }
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_end(mut self, end: EndCondition) -> Self {
        self.end = end;
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.frequency.is_recurring()
    }

    /// Checks the config against the anchor it will be saved with.
    pub fn validate(&self, anchor: NaiveDate) -> Result<(), ValidationError> {
        crate::timezone::validate_timezone(&self.timezone)?;

        if !self.is_recurring() {
            return Ok(());
        }
        if self.interval < 1 {
            return Err(ValidationError::InvalidInterval(self.interval));
        }
        match self.end {
            EndCondition::Count(0) => return Err(ValidationError::InvalidEndCount(0)),
            EndCondition::Date(end) if end < anchor => {
                return Err(ValidationError::EndDateBeforeAnchor { end, anchor })
            }
            _ => {}
        }
        if self.frequency == Frequency::Weekly && self.weekdays.is_empty() {
            return Err(ValidationError::EmptyWeekdays);
        }
        Ok(())
    }
}

// ============================================================================
// Series and persisted records
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Task,
    Event,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Task => write!(f, "task"),
            EntityType::Event => write!(f, "event"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid entity type: {0}")]
pub struct ParseEntityTypeError(String);

impl FromStr for EntityType {
    type Err = ParseEntityTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task" => Ok(EntityType::Task),
            "event" => Ok(EntityType::Event),
            _ => Err(ParseEntityTypeError(s.to_string())),
        }
    }
}

/// The template entity of a recurring task or event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Series {
    #[serde(with = "uuid::serde::compact")]
    pub id: Uuid,
    pub entity_type: EntityType,
    pub title: String,
    pub description: Option<String>,
    /// Civil start date and time in `timezone`
    pub anchor_at: NaiveDateTime,
    /// Encoded rule; NULL for non-recurring templates
    pub rule: Option<String>,
    /// IANA timezone name (e.g., "America/New_York")
    pub timezone: String,
    /// Series this one was split from by an edit-this-and-future
    pub split_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Series {
    pub fn anchor_date(&self) -> NaiveDate {
        self.anchor_at.date()
    }

    pub fn start_time(&self) -> NaiveTime {
        self.anchor_at.time()
    }

    pub fn is_task(&self) -> bool {
        self.entity_type == EntityType::Task
    }

    /// Decodes the stored rule, falling back to a non-recurring config.
    pub fn recurrence(&self) -> RecurrenceConfig {
        self.rule
            .as_deref()
            .and_then(|rule| crate::codec::decode(rule, &self.timezone))
            .unwrap_or_else(|| RecurrenceConfig::default_for(self.timezone.clone()))
    }
}

/// An occurrence removed from its series.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct SeriesException {
    #[serde(with = "uuid::serde::compact")]
    pub series_id: Uuid,
    pub exception_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Fields an override or a series split may replace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub description: Option<Option<String>>,
    /// New time of day, in the series timezone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
}

impl FieldPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.start_time.is_none()
    }
}

/// An occurrence whose displayed content is replaced; it stays in the series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeriesOverride {
    #[serde(with = "uuid::serde::compact")]
    pub series_id: Uuid,
    pub occurrence_date: NaiveDate,
    pub modified_fields: FieldPatch,
    pub updated_at: DateTime<Utc>,
}

/// Task-only record that one occurrence is done, keyed by its start instant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct CompletionRecord {
    pub id: Uuid,
    #[serde(with = "uuid::serde::compact")]
    pub series_id: Uuid,
    pub occurrence_start_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub completed_by: String,
}

// ============================================================================
// Derived occurrences
// ============================================================================

/// One virtual instance of a series.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Occurrence {
    pub series_id: Uuid,
    /// Civil date in the series timezone
    pub occurrence_date: NaiveDate,
    /// Scheduled start; the key completions are stored under
    pub occurrence_start_at: DateTime<Utc>,
    /// Start after an override moved the time of day
    pub effective_start_at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub is_exception: bool,
    pub is_override: bool,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
}

// ============================================================================
// Data Transfer Objects (DTOs)
// ============================================================================

/// Data required to create a new series template
#[derive(Debug, Clone)]
pub struct NewSeries {
    pub entity_type: EntityType,
    pub title: String,
    pub description: Option<String>,
    /// Civil start in `config.timezone`
    pub anchor_at: NaiveDateTime,
    pub config: RecurrenceConfig,
}

/// Data required to mark one task occurrence done
#[derive(Debug, Clone)]
pub struct NewCompletion {
    pub series_id: Uuid,
    pub occurrence_date: NaiveDate,
    pub occurrence_start_at: DateTime<Utc>,
    pub completed_by: String,
    /// Rule the occurrence was checked against; nothing is written if the
    /// stored rule no longer matches
    pub expected_rule: Option<String>,
}

/// Upstream acknowledgement that a destructive-looking action was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Pending,
}

/// Window for the "what should I still do" view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpcomingQuery {
    pub max_count: usize,
    pub months_ahead: u32,
}

impl Default for UpcomingQuery {
    fn default() -> Self {
        Self {
            max_count: 10,
            months_ahead: 3,
        }
    }
}

/// Result of splitting a series with edit-this-and-future
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub previous: Series,
    pub created: Series,
}
