use crate::error::ValidationError;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Parse an IANA timezone name
pub fn parse_timezone(timezone: &str) -> Result<Tz, ValidationError> {
    Tz::from_str(timezone).map_err(|_| ValidationError::InvalidTimezone(timezone.to_string()))
}

/// Validate IANA timezone name
pub fn validate_timezone(timezone: &str) -> Result<(), ValidationError> {
    parse_timezone(timezone).map(|_| ())
}

/// Resolve a civil date-time in `tz` to an instant.
///
/// Ambiguous times (DST fold) take the earliest instant. Times that do not
/// exist (DST gap) move forward by the gap, one hour at a time.
pub fn resolve_local(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    let mut candidate = local;
    for _ in 0..3 {
        if let Some(resolved) = tz.from_local_datetime(&candidate).earliest() {
            return resolved.with_timezone(&Utc);
        }
        candidate += Duration::hours(1);
    }
    // No zone has a gap longer than a few hours; read the civil time as UTC.
    Utc.from_utc_datetime(&local)
}

/// Today's civil date in `tz`
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Civil date of an instant in `tz`
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Format datetime with timezone-aware display
pub fn format_with_timezone(datetime: DateTime<Utc>, tz: Tz, format: &str) -> String {
    datetime.with_timezone(&tz).format(format).to_string()
}
