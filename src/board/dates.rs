//! Calendar arithmetic for the weekly views.
//!
//! All dates here are local calendar dates (`NaiveDate`). The only time zone
//! conversion happens in [`local_due_date`], using the configured offset.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Day bucket names, Sunday first.
pub const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

pub const OVERDUE: &str = "Overdue";

/// The Sunday..Saturday week containing a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekWindow {
    /// # Panics
    ///
    /// Panics when `today` is within a week of chrono's date limits. Callers
    /// taking dates from outside check [`is_supported`] first.
    pub fn containing(today: NaiveDate) -> Self {
        let back = today.weekday().num_days_from_sunday() as i64;
        let start = today - Duration::days(back);
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..7).map(move |offset| self.start + Duration::days(offset))
    }

    /// The date in this window for a day name such as `"Tuesday"`.
    pub fn date_for_day(&self, day_name: &str) -> Option<NaiveDate> {
        let index = DAY_NAMES
            .iter()
            .position(|d| d.eq_ignore_ascii_case(day_name))?;
        Some(self.start + Duration::days(index as i64))
    }
}

/// Four-digit years only. Every date taken from a request or a board field
/// passes through this check, which keeps the week and range arithmetic in
/// this crate far from chrono's limits.
pub fn is_supported(date: NaiveDate) -> bool {
    (1..=9999).contains(&date.year())
}

pub fn day_name(date: NaiveDate) -> &'static str {
    DAY_NAMES[date.weekday().num_days_from_sunday() as usize]
}

/// Parse a planned-date field value.
///
/// Accepts `YYYY-MM-DD` and ISO date-times; date-times are truncated to
/// their date part without time zone conversion.
pub fn parse_planned_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .filter(|d| is_supported(*d))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Inclusive planned range. An end before the start collapses to one day.
pub fn planned_range(start: NaiveDate, end: Option<NaiveDate>) -> (NaiveDate, NaiveDate) {
    match end {
        Some(end) if end >= start => (start, end),
        _ => (start, start),
    }
}

pub fn local_due_date(due: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    due.with_timezone(&offset).date_naive()
}

/// Noon on `date` in the local calendar, as a UTC instant. Used for due
/// dates entered as plain dates.
pub fn local_noon_utc(date: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    date.and_hms_opt(12, 0, 0)?
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn local_today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

/// Offset from a minute count, falling back to UTC when out of range.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}
