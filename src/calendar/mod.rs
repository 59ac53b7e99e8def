//! Dual-calendar date formatting for letter headers.
//!
//! Produces Gregorian (Masehi) and Hijri date parts split into a date portion
//! and a year portion, so the header can left-justify the date and
//! right-justify the year on the same row.

mod hijri;

pub use hijri::{to_hijri, HijriDate};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use log::warn;
use serde::Serialize;
use std::fmt;

pub const GREGORIAN_MONTHS: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

pub const HIJRI_MONTHS: [&str; 12] = [
    "Muharram",
    "Safar",
    "Rabi’ul Awal",
    "Rabi’ul Akhir",
    "Jumadil Awal",
    "Jumadil Akhir",
    "Rajab",
    "Sya’ban",
    "Ramadhan",
    "Syawal",
    "Dzulqa’dah",
    "Dzulhijjah",
];

const ROMAN_MONTHS: [&str; 12] = [
    "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII",
];

/// One calendar's date split for left/right justification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateParts {
    /// Day and month name, e.g. "26 November".
    pub date: String,
    /// Year with era suffix, e.g. "2025 M".
    pub year: String,
}

impl fmt::Display for DateParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.year)
    }
}

/// Gregorian and Hijri representations of the same civil day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DualDate {
    pub gregorian: DateParts,
    pub hijri: DateParts,
}

/// Fiscal year running July through June, labelled by its two calendar years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiscalYear {
    pub start: i32,
}

impl FiscalYear {
    pub fn containing(date: NaiveDate) -> Self {
        let start = if date.month() >= 7 {
            date.year()
        } else {
            date.year() - 1
        };
        Self { start }
    }

    /// Key-safe label, e.g. "2025-2026".
    pub fn bucket(&self) -> String {
        format!("{}-{}", self.start, self.start + 1)
    }
}

impl fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start, self.start + 1)
    }
}

/// Civil date of `at` in a fixed UTC offset. Offsets outside ±14h fall back to UTC.
pub fn local_date(at: DateTime<Utc>, utc_offset_hours: i32) -> NaiveDate {
    match FixedOffset::east_opt(utc_offset_hours * 3600) {
        Some(offset) => at.with_timezone(&offset).date_naive(),
        None => at.date_naive(),
    }
}

pub fn format_dual_date(date: NaiveDate) -> DualDate {
    DualDate {
        gregorian: gregorian_parts(date),
        hijri: hijri_parts(date),
    }
}

pub fn gregorian_parts(date: NaiveDate) -> DateParts {
    DateParts {
        date: format!("{} {}", date.day(), month_name(&GREGORIAN_MONTHS, date.month())),
        year: format!("{} M", date.year()),
    }
}

pub fn hijri_parts(date: NaiveDate) -> DateParts {
    let Some(h) = to_hijri(date) else {
        warn!("No Hijri date for {}", date);
        return DateParts::default();
    };
    DateParts {
        date: format!("{} {}", h.day, month_name(&HIJRI_MONTHS, h.month)),
        year: format!("{} H", h.year),
    }
}

/// Format a date in Indonesian long form (e.g., "30 Desember 2025").
pub fn format_indonesian_date(date: NaiveDate) -> String {
    format!(
        "{} {} {}",
        date.day(),
        month_name(&GREGORIAN_MONTHS, date.month()),
        date.year()
    )
}

/// Uppercase Roman numeral for a 1-based month; empty outside 1..=12.
pub fn to_roman(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| ROMAN_MONTHS.get(i as usize))
        .copied()
        .unwrap_or("")
}

fn month_name(names: &[&'static str; 12], month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| names.get(i as usize))
        .copied()
        .unwrap_or(names[0])
}
