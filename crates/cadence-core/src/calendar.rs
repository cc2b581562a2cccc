//! Civil-calendar helpers shared by the rule codec and the expander.
//!
//! Everything here works on `NaiveDate`: positions and weekdays are properties
//! of the date in the series timezone, never of an instant.

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::WeekdayCode;

/// Sunday-first lookup, indexed by `num_days_from_sunday`.
const WEEKDAY_CODES: [WeekdayCode; 7] = [
    WeekdayCode::Su,
    WeekdayCode::Mo,
    WeekdayCode::Tu,
    WeekdayCode::We,
    WeekdayCode::Th,
    WeekdayCode::Fr,
    WeekdayCode::Sa,
];

const ORDINAL_LABELS: [&str; 5] = ["first", "second", "third", "fourth", "fifth"];

/// Position of a date among the same weekdays of its month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdayOrdinal {
    /// 1..=5, or -1 when the date is the last such weekday of the month
    pub position: i8,
    pub label: &'static str,
}

/// "2nd Tuesday", "last Friday", ...
///
/// A date whose weekday does not occur again in its month is always `-1`/"last",
/// even when it is also the 4th or 5th.
pub fn nth_weekday_ordinal(date: NaiveDate) -> WeekdayOrdinal {
    let day = date.day();
    if day + 7 > days_in_month(date.year(), date.month()) {
        return WeekdayOrdinal {
            position: -1,
            label: "last",
        };
    }
    let position = day.div_ceil(7);
    WeekdayOrdinal {
        position: position as i8,
        label: ORDINAL_LABELS[(position - 1) as usize],
    }
}

pub fn weekday_code(date: NaiveDate) -> WeekdayCode {
    WEEKDAY_CODES[date.weekday().num_days_from_sunday() as usize]
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// The given day of month, pulled back to the month's last day if it is too short.
pub fn clamp_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day.min(days_in_month(year, month)))
}

/// Month arithmetic on (year, month) pairs; `month` is 1-based.
pub fn add_months(year: i32, month: u32, months: u32) -> (i32, u32) {
    let zero_based = i64::from(month) - 1 + i64::from(months);
    let year = i64::from(year) + zero_based.div_euclid(12);
    (year as i32, (zero_based.rem_euclid(12) + 1) as u32)
}

/// Locates the `position`-th `weekday` of a month; `-1` means the last one.
///
/// Returns `None` when the month has no such date (e.g. a 5th Monday).
pub fn nth_weekday_of_month(
    year: i32,
    month: u32,
    weekday: WeekdayCode,
    position: i8,
) -> Option<NaiveDate> {
    let target = weekday.to_chrono().num_days_from_monday() as i64;

    if position < 0 {
        let last = NaiveDate::from_ymd_opt(year, month, days_in_month(year, month))?;
        let back = (last.weekday().num_days_from_monday() as i64 - target).rem_euclid(7);
        return Some(last - Duration::days(back));
    }

    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let forward = (target - first.weekday().num_days_from_monday() as i64).rem_euclid(7);
    let date = first + Duration::days(forward + 7 * (i64::from(position) - 1));
    (date.month() == month && position >= 1).then_some(date)
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}
