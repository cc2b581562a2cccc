//! Conversion between [`RecurrenceConfig`] and the stored rule string.
//!
//! The rule string is an RFC 5545 flavoured subset: `;`-separated `KEY=VALUE`
//! tokens emitted in the fixed order FREQ, INTERVAL, BYDAY, BYMONTHDAY, UNTIL,
//! COUNT. Decoding is lenient: a rule written by a newer version must still
//! load, so unknown frequencies fall back to daily and malformed values keep
//! their defaults instead of failing.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

use crate::calendar::{nth_weekday_ordinal, weekday_code};
use crate::models::{EndCondition, Frequency, MonthlyType, RecurrenceConfig, WeekdayCode};

static RE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+)=([^;]*)").expect("valid rule token regex"));
static RE_POSITIONAL_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-?\d+)([A-Z]{2})$").expect("valid positional BYDAY regex"));
static RE_UNTIL_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{8})").expect("valid UNTIL regex"));

/// Encodes a config anchored at `anchor`. Returns `None` for non-recurring configs.
///
/// `Custom` has no representation of its own and is written as `DAILY`.
pub fn encode(config: &RecurrenceConfig, anchor: NaiveDate) -> Option<String> {
    let freq = match config.frequency {
        Frequency::None => return None,
        Frequency::Daily | Frequency::Custom => "DAILY",
        Frequency::Weekly => "WEEKLY",
        Frequency::Monthly => "MONTHLY",
        Frequency::Yearly => "YEARLY",
    };

    let mut parts = vec![format!("FREQ={freq}")];

    if config.interval > 1 {
        parts.push(format!("INTERVAL={}", config.interval));
    }

    match config.frequency {
        Frequency::Weekly if !config.weekdays.is_empty() => {
            let days: Vec<&str> = config.weekdays.iter().map(|d| d.as_str()).collect();
            parts.push(format!("BYDAY={}", days.join(",")));
        }
        Frequency::Monthly => match config.monthly_type {
            MonthlyType::Weekday => {
                let ordinal = nth_weekday_ordinal(anchor);
                parts.push(format!("BYDAY={}{}", ordinal.position, weekday_code(anchor)));
            }
            MonthlyType::Day => {
                parts.push(format!("BYMONTHDAY={}", anchor.day()));
            }
        },
        _ => {}
    }

    match config.end {
        EndCondition::Never => {}
        EndCondition::Date(until) => {
            parts.push(format!("UNTIL={}T235959Z", until.format("%Y%m%d")))
        }
        EndCondition::Count(count) => parts.push(format!("COUNT={count}")),
    }

    Some(parts.join(";"))
}

/// Decodes a stored rule string. Returns `None` for empty input.
///
/// Keys missing from the string keep the values of
/// [`RecurrenceConfig::default_for`], except that a rule without `FREQ` is
/// treated as daily: a stored rule always means the template recurs.
pub fn decode(rule: &str, timezone: &str) -> Option<RecurrenceConfig> {
    let rule = rule.trim();
    let rule = rule.strip_prefix("RRULE:").unwrap_or(rule);
    if rule.is_empty() {
        return None;
    }

    let mut config = RecurrenceConfig::default_for(timezone);
    config.frequency = Frequency::Daily;

    for caps in RE_TOKEN.captures_iter(rule) {
        let value = &caps[2];
        match &caps[1] {
            "FREQ" => config.frequency = decode_frequency(value),
            "INTERVAL" => {
                if let Some(interval) = value.parse::<u32>().ok().filter(|n| *n >= 1) {
                    config.interval = interval;
                }
            }
            "BYDAY" => decode_byday(value, &mut config),
            "BYMONTHDAY" => config.monthly_type = MonthlyType::Day,
            "UNTIL" => {
                let until = RE_UNTIL_DATE
                    .captures(value)
                    .and_then(|c| NaiveDate::parse_from_str(&c[1], "%Y%m%d").ok());
                if let Some(until) = until {
                    config.end = EndCondition::Date(until);
                }
            }
            "COUNT" => {
                if let Ok(count) = value.parse::<u32>() {
                    config.end = EndCondition::Count(count);
                }
            }
            other => tracing::debug!(key = other, "Ignoring unsupported rule key"),
        }
    }

    Some(config)
}

fn decode_frequency(value: &str) -> Frequency {
    match value {
        "DAILY" => Frequency::Daily,
        "WEEKLY" => Frequency::Weekly,
        "MONTHLY" => Frequency::Monthly,
        "YEARLY" => Frequency::Yearly,
        unknown => {
            tracing::warn!(freq = unknown, "Unknown FREQ in stored rule, reading it as DAILY");
            Frequency::Daily
        }
    }
}

fn decode_byday(value: &str, config: &mut RecurrenceConfig) {
    if let Some(caps) = RE_POSITIONAL_DAY.captures(value) {
        // The position itself is re-derived from the anchor during expansion.
        if let Ok(code) = caps[2].parse::<WeekdayCode>() {
            config.monthly_type = MonthlyType::Weekday;
            config.weekdays = [code].into();
        }
        return;
    }

    config.weekdays = value
        .split(',')
        .filter_map(|day| day.trim().parse::<WeekdayCode>().ok())
        .collect();
}

/// Human-readable summary, e.g. "Every 2 weeks on Mon, Wed" or
/// "Monthly on the second Tuesday, 4 times".
pub fn describe(config: &RecurrenceConfig, anchor: NaiveDate) -> String {
    let unit = |singular: &str, plural: &str| {
        if config.interval > 1 {
            format!("Every {} {plural}", config.interval)
        } else {
            singular.to_string()
        }
    };

    let mut text = match config.frequency {
        Frequency::None => return "Does not repeat".to_string(),
        Frequency::Daily | Frequency::Custom => unit("Daily", "days"),
        Frequency::Weekly => {
            let days: Vec<&str> = config.weekdays.iter().map(|d| short_name(*d)).collect();
            format!("{} on {}", unit("Weekly", "weeks"), days.join(", "))
        }
        Frequency::Monthly => match config.monthly_type {
            MonthlyType::Day => format!("{} on day {}", unit("Monthly", "months"), anchor.day()),
            MonthlyType::Weekday => format!(
                "{} on the {} {}",
                unit("Monthly", "months"),
                nth_weekday_ordinal(anchor).label,
                anchor.format("%A")
            ),
        },
        Frequency::Yearly => format!(
            "{} on {} {}",
            unit("Yearly", "years"),
            anchor.format("%B"),
            anchor.day()
        ),
    };

    match config.end {
        EndCondition::Never => {}
        EndCondition::Date(until) => {
            text.push_str(&format!(", until {}", until.format("%Y-%m-%d")))
        }
        EndCondition::Count(1) => text.push_str(", once"),
        EndCondition::Count(count) => text.push_str(&format!(", {count} times")),
    }
    text
}

fn short_name(day: WeekdayCode) -> &'static str {
    match day {
        WeekdayCode::Mo => "Mon",
        WeekdayCode::Tu => "Tue",
        WeekdayCode::We => "Wed",
        WeekdayCode::Th => "Thu",
        WeekdayCode::Fr => "Fri",
        WeekdayCode::Sa => "Sat",
        WeekdayCode::Su => "Sun",
    }
}
