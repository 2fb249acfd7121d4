//! Billing-cycle calendar math.
//!
//! Everything here is pure: callers pass the reference date in, nothing
//! reads the system clock. Dates are calendar days (`NaiveDate`), so
//! window comparisons never see a time-of-day component.

use std::fmt;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A day of the month in `1..=31`, as stored for cutoff and due days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct DayOfMonth(u32);

impl DayOfMonth {
    pub fn new(day: u32) -> Option<Self> {
        (1..=31).contains(&day).then_some(DayOfMonth(day))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for DayOfMonth {
    type Error = String;

    fn try_from(day: u32) -> Result<Self, Self::Error> {
        DayOfMonth::new(day).ok_or_else(|| format!("day must be 1..31, got {day}"))
    }
}

impl From<DayOfMonth> for u32 {
    fn from(day: DayOfMonth) -> Self {
        day.0
    }
}

impl fmt::Display for DayOfMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which statement cycle to resolve relative to the reference date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleMode {
    #[default]
    Current,
    Previous,
}

/// Inclusive calendar-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CycleWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).expect("month must be 1..=12")
}

/// Number of days in `month` (1-based) of `year`.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = first_of_month(year, month);
    let next = add_months(first, 1);
    (next - first).num_days() as u32
}

/// `day` clamped to the last day of the month, so a cutoff of 31 lands
/// on the 30th in April and on the 28th/29th in February.
pub fn clamp_day_to_month(year: i32, month: u32, day: u32) -> u32 {
    day.min(days_in_month(year, month))
}

/// The statement closing date for `cutoff_day` in the given month.
pub fn cutoff_date(year: i32, month: u32, cutoff_day: DayOfMonth) -> NaiveDate {
    let day = clamp_day_to_month(year, month, cutoff_day.get());
    NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is always valid")
}

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + chrono::Duration::days(days)
}

/// Month addition; the day is clamped to the target month's length.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let step = Months::new(months.unsigned_abs());
    let shifted = if months >= 0 {
        date.checked_add_months(step)
    } else {
        date.checked_sub_months(step)
    };
    shifted.expect("date out of range")
}

pub fn to_iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses a strict `YYYY-MM-DD` date.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

pub fn to_date_only(timestamp: NaiveDateTime) -> NaiveDate {
    timestamp.date()
}

/// The statement cycle containing `reference`.
///
/// A reference date equal to the month's cutoff belongs to the cycle that
/// closes on it.
pub fn current_cycle(reference: NaiveDate, cutoff_day: DayOfMonth) -> CycleWindow {
    let month_start = first_of_month(reference.year(), reference.month());
    let this_cutoff = cutoff_date(reference.year(), reference.month(), cutoff_day);

    if reference <= this_cutoff {
        let prev = add_months(month_start, -1);
        let prev_cutoff = cutoff_date(prev.year(), prev.month(), cutoff_day);
        return CycleWindow {
            start: add_days(prev_cutoff, 1),
            end: this_cutoff,
        };
    }

    let next = add_months(month_start, 1);
    CycleWindow {
        start: add_days(this_cutoff, 1),
        end: cutoff_date(next.year(), next.month(), cutoff_day),
    }
}

/// Resolves the cycle for `mode`. The previous cycle is the current cycle
/// of the day before the current cycle starts.
pub fn resolve_cycle(reference: NaiveDate, cutoff_day: DayOfMonth, mode: CycleMode) -> CycleWindow {
    let current = current_cycle(reference, cutoff_day);
    match mode {
        CycleMode::Current => current,
        CycleMode::Previous => current_cycle(add_days(current.start, -1), cutoff_day),
    }
}

/// Window after the cycle closes in which its payment is expected.
/// `None` or `Some(0)` both mean no due day is configured.
pub fn derive_payment_window(cycle: &CycleWindow, due_day: Option<u32>) -> Option<CycleWindow> {
    match due_day {
        None | Some(0) => None,
        Some(days) => Some(CycleWindow {
            start: add_days(cycle.end, 1),
            end: add_days(cycle.end, i64::from(days)),
        }),
    }
}

/// Range searched for payments: the payment window, or the cycle itself
/// when no due day is configured.
pub fn derive_payment_range(cycle: &CycleWindow, due_day: Option<u32>) -> CycleWindow {
    derive_payment_window(cycle, due_day).unwrap_or(*cycle)
}

pub fn is_within_window(today: NaiveDate, window: Option<&CycleWindow>) -> bool {
    window.is_some_and(|w| w.contains(today))
}
