use chrono::NaiveDate;
use thiserror::Error;

/// A `RecurrenceConfig` that must not be saved.
///
/// Raised at config-save time, before any rule string is persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Interval must be at least 1, got {0}")]
    InvalidInterval(u32),

    #[error("End count must be at least 1, got {0}")]
    InvalidEndCount(u32),

    #[error("End date {end} precedes the anchor date {anchor}")]
    EndDateBeforeAnchor { end: NaiveDate, anchor: NaiveDate },

    #[error("A weekly rule needs at least one weekday")]
    EmptyWeekdays,

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Misuse of a series operation. Always raised before any write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("Completion is only defined for task series")]
    NotATask,

    #[error("Cannot split at {date}: the series is anchored on {anchor}")]
    SplitAtOrBeforeAnchor { date: NaiveDate, anchor: NaiveDate },

    #[error("{0} is not an occurrence of this series")]
    NotAnOccurrence(NaiveDate),

    #[error("Series is not recurring")]
    NotRecurring,

    #[error("Skipping an occurrence requires confirmation")]
    ConfirmationRequired,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Serialization error")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error")]
    Config(#[from] figment::Error),

    #[error("Series not found: {0}")]
    NotFound(String),

    #[error("Invalid recurrence: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid operation: {0}")]
    Operation(#[from] OperationError),
}
