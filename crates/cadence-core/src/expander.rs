//! Expansion of a [`RecurrenceConfig`] into concrete civil dates.
//!
//! Expansion is a pure function of the anchor, the config and the window:
//! there is no cursor state to carry between calls, and the same arguments
//! always produce the same dates.

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::VecDeque;

use crate::calendar::{
    add_months, clamp_day, nth_weekday_of_month, nth_weekday_ordinal, week_start, weekday_code,
};
use crate::models::{EndCondition, Frequency, MonthlyType, RecurrenceConfig, WeekdayCode};

/// Items emitted by a single `expand` call unless configured otherwise.
pub const DEFAULT_HARD_CAP: usize = 1000;

/// Consecutive periods without a date after which a rule is considered exhausted.
const MAX_EMPTY_PERIODS: u32 = 64;

/// Inclusive range of civil dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Window {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// `from` and the `months` following it, clamped like a monthly rule.
    pub fn months_from(from: NaiveDate, months: u32) -> Self {
        let (year, month) = add_months(from.year(), from.month(), months);
        let to = clamp_day(year, month, from.day()).unwrap_or(NaiveDate::MAX);
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Date generator for one period (a day, a week, a month or a year) of a rule.
#[derive(Debug, Clone)]
enum Pattern {
    /// Non-recurring: the anchor and nothing else
    Single,
    /// Weekly rule without weekdays; never occurs
    Empty,
    Daily,
    Weekly { days: Vec<WeekdayCode> },
    MonthlyDay { day: u32 },
    MonthlyWeekday { weekday: WeekdayCode, position: i8 },
    Yearly { month: u32, day: u32 },
}

impl Pattern {
    fn from_config(anchor: NaiveDate, config: &RecurrenceConfig) -> Self {
        match config.frequency {
            Frequency::None => Pattern::Single,
            Frequency::Daily | Frequency::Custom => Pattern::Daily,
            Frequency::Weekly if config.weekdays.is_empty() => Pattern::Empty,
            Frequency::Weekly => Pattern::Weekly {
                days: config.weekdays.iter().copied().collect(),
            },
            Frequency::Monthly => match config.monthly_type {
                MonthlyType::Day => Pattern::MonthlyDay { day: anchor.day() },
                MonthlyType::Weekday => Pattern::MonthlyWeekday {
                    weekday: weekday_code(anchor),
                    position: nth_weekday_ordinal(anchor).position,
                },
            },
            Frequency::Yearly => Pattern::Yearly {
                month: anchor.month(),
                day: anchor.day(),
            },
        }
    }
}

/// Every occurrence date from the anchor onward, in increasing order.
///
/// Honors the end condition; a `Never` rule yields forever, so callers bound
/// the iteration themselves (see [`expand`]).
#[derive(Debug, Clone)]
pub struct OccurrenceIter {
    anchor: NaiveDate,
    interval: i64,
    pattern: Pattern,
    end: EndCondition,
    period: i64,
    pending: VecDeque<NaiveDate>,
    emitted: u32,
    empty_periods: u32,
    exhausted: bool,
}

impl OccurrenceIter {
    pub fn new(anchor: NaiveDate, config: &RecurrenceConfig) -> Self {
        let pattern = Pattern::from_config(anchor, config);
        Self {
            anchor,
            interval: i64::from(config.interval.max(1)),
            exhausted: matches!(pattern, Pattern::Empty),
            pattern,
            end: config.end,
            period: 0,
            pending: VecDeque::new(),
            emitted: 0,
            empty_periods: 0,
        }
    }

    /// Jumps ahead to the period containing `from`.
    ///
    /// Count-limited rules are never skipped: their limit is measured from the
    /// anchor, so every earlier occurrence has to be counted.
    pub fn seek(mut self, from: NaiveDate) -> Self {
        if matches!(self.end, EndCondition::Count(_)) || from <= self.anchor || self.period != 0 {
            return self;
        }
        let elapsed = match self.pattern {
            Pattern::Single | Pattern::Empty => 0,
            Pattern::Daily => (from - self.anchor).num_days(),
            Pattern::Weekly { .. } => (week_start(from) - week_start(self.anchor)).num_days() / 7,
            Pattern::MonthlyDay { .. } | Pattern::MonthlyWeekday { .. } => {
                i64::from(from.year() - self.anchor.year()) * 12 + i64::from(from.month())
                    - i64::from(self.anchor.month())
            }
            Pattern::Yearly { .. } => i64::from(from.year() - self.anchor.year()),
        };
        self.period = (elapsed / self.interval).max(0);
        self
    }

    fn fill_period(&mut self) {
        let Some(steps) = self.period.checked_mul(self.interval) else {
            self.exhausted = true;
            return;
        };

        let candidates: Option<Vec<NaiveDate>> = match &self.pattern {
            Pattern::Single => {
                if self.period > 0 {
                    None
                } else {
                    Some(vec![self.anchor])
                }
            }
            Pattern::Empty => None,
            Pattern::Daily => self
                .anchor
                .checked_add_signed(Duration::days(steps))
                .map(|d| vec![d]),
            Pattern::Weekly { days } => week_start(self.anchor)
                .checked_add_signed(Duration::weeks(steps))
                .map(|monday| {
                    days.iter()
                        .map(|d| monday + Duration::days(i64::from(d.days_from_monday())))
                        .filter(|d| *d >= self.anchor)
                        .collect()
                }),
            Pattern::MonthlyDay { day } => self
                .month_at(steps)
                .map(|(y, m)| clamp_day(y, m, *day).into_iter().collect()),
            Pattern::MonthlyWeekday { weekday, position } => self
                .month_at(steps)
                .map(|(y, m)| {
                    nth_weekday_of_month(y, m, *weekday, *position)
                        .into_iter()
                        .collect()
                }),
            Pattern::Yearly { month, day } => i32::try_from(steps)
                .ok()
                .and_then(|s| self.anchor.year().checked_add(s))
                .filter(|y| NaiveDate::from_ymd_opt(*y, 1, 1).is_some())
                .map(|y| clamp_day(y, *month, *day).into_iter().collect()),
        };

        self.period += 1;
        match candidates {
            None => self.exhausted = true,
            Some(dates) if dates.is_empty() => {
                self.empty_periods += 1;
                if self.empty_periods >= MAX_EMPTY_PERIODS {
                    self.exhausted = true;
                }
            }
            Some(dates) => {
                self.empty_periods = 0;
                self.pending.extend(dates);
            }
        }
    }

    /// (year, month) `steps` months after the anchor's month, if representable.
    fn month_at(&self, steps: i64) -> Option<(i32, u32)> {
        let steps = u32::try_from(steps).ok()?;
        let (year, month) = add_months(self.anchor.year(), self.anchor.month(), steps);
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| (year, month))
    }
}

impl Iterator for OccurrenceIter {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        loop {
            if self.exhausted {
                return None;
            }
            if let EndCondition::Count(limit) = self.end {
                if self.emitted >= limit {
                    self.exhausted = true;
                    return None;
                }
            }
            if let Some(date) = self.pending.pop_front() {
                if let EndCondition::Date(until) = self.end {
                    if date > until {
                        self.exhausted = true;
                        return None;
                    }
                }
                self.emitted += 1;
                return Some(date);
            }
            self.fill_period();
        }
    }
}

/// Occurrence dates of a rule that fall inside `window`, in increasing order.
///
/// At most `hard_cap` dates are returned; reaching the cap truncates the
/// result rather than failing.
pub fn expand(
    anchor: NaiveDate,
    config: &RecurrenceConfig,
    window: Window,
    hard_cap: usize,
) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    if window.to < window.from || window.to < anchor {
        return dates;
    }

    for date in OccurrenceIter::new(anchor, config).seek(window.from) {
        if date > window.to {
            break;
        }
        if date < window.from {
            continue;
        }
        if dates.len() >= hard_cap {
            tracing::warn!(hard_cap, %anchor, "Occurrence expansion truncated at hard cap");
            break;
        }
        dates.push(date);
    }
    dates
}

/// The last `hard_cap` occurrence dates inside `window`, in increasing order.
///
/// The whole window is walked; when it holds more than `hard_cap` dates the
/// oldest ones are dropped.
pub fn expand_latest(
    anchor: NaiveDate,
    config: &RecurrenceConfig,
    window: Window,
    hard_cap: usize,
) -> Vec<NaiveDate> {
    if hard_cap == 0 || window.to < window.from || window.to < anchor {
        return Vec::new();
    }

    let mut dates = VecDeque::new();
    let mut dropped = 0usize;
    for date in OccurrenceIter::new(anchor, config).seek(window.from) {
        if date > window.to {
            break;
        }
        if date < window.from {
            continue;
        }
        if dates.len() == hard_cap {
            dates.pop_front();
            dropped += 1;
        }
        dates.push_back(date);
    }

    if dropped > 0 {
        tracing::warn!(hard_cap, dropped, %anchor, "Oldest occurrences dropped at hard cap");
    }
    dates.into()
}

/// Whether `date` is produced by the rule at all (exceptions not considered).
pub fn is_occurrence(anchor: NaiveDate, config: &RecurrenceConfig, date: NaiveDate) -> bool {
    !expand(anchor, config, Window::new(date, date), 1).is_empty()
}

/// Number of occurrences strictly before `date`.
pub fn count_before(anchor: NaiveDate, config: &RecurrenceConfig, date: NaiveDate) -> u32 {
    OccurrenceIter::new(anchor, config)
        .take_while(|d| *d < date)
        .count() as u32
}
