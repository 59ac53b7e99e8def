//! Umm al-Qura month reckoning.
//!
//! Backed by ICU4X's Umm al-Qura calendar. A month opens the day after the
//! 29th only when, at Mecca sunset, the conjunction has passed and the moon
//! sets after the sun; otherwise the month runs to 30 days.

use chrono::{Datelike, NaiveDate};
use icu_calendar::{islamic::IslamicUmmAlQura, Date};

/// A date in the Hijri calendar. `month` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HijriDate {
    pub year: i64,
    pub month: u32,
    pub day: u32,
}

/// Convert a civil Gregorian date to its Umm al-Qura Hijri date.
///
/// Returns `None` only for dates ICU cannot represent as ISO dates.
pub fn to_hijri(date: NaiveDate) -> Option<HijriDate> {
    let iso = Date::try_new_iso_date(date.year(), date.month() as u8, date.day() as u8).ok()?;
    let hijri = iso.to_calendar(IslamicUmmAlQura::new());

    Some(HijriDate {
        year: i64::from(hijri.year().number),
        month: hijri.month().ordinal,
        day: hijri.day_of_month().0,
    })
}
