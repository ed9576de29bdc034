//! Due-date tokens: a closed set of relative and absolute forms.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;

use crate::model::DueDate;

static RE_DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(\d{4})-(\d{2})-(\d{2})|(\d{1,2})/(\d{1,2})|(end of (?:the )?week)|(next week)|(today|tonight|tomorrow|eod)|(monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b",
    )
    .unwrap()
});

/// A date token found in text, with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMatch {
    pub start: usize,
    pub end: usize,
    pub due: DueDate,
}

/// Every date token in `text`, resolved against `reference` where possible.
pub fn find_dates(text: &str, reference: NaiveDate) -> Vec<DateMatch> {
    RE_DATE_TOKEN
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let token = whole.as_str().to_string();
            let date = if let (Some(y), Some(m), Some(d)) = (caps.get(1), caps.get(2), caps.get(3)) {
                NaiveDate::from_ymd_opt(y.as_str().parse().ok()?, m.as_str().parse().ok()?, d.as_str().parse().ok()?)
            } else if let (Some(m), Some(d)) = (caps.get(4), caps.get(5)) {
                month_day(m.as_str().parse().ok()?, d.as_str().parse().ok()?, reference)
            } else if caps.get(6).is_some() {
                Some(end_of_week(reference))
            } else if caps.get(7).is_some() {
                Some(next_weekday(reference, Weekday::Mon, false))
            } else if let Some(relative) = caps.get(8) {
                match relative.as_str().to_ascii_lowercase().as_str() {
                    "tomorrow" => reference.succ_opt(),
                    _ => Some(reference),
                }
            } else {
                let weekday: Weekday = caps.get(9)?.as_str().parse().ok()?;
                Some(next_weekday(reference, weekday, true))
            };

            // "13/45" style numbers are not dates.
            if caps.get(4).is_some() && date.is_none() {
                return None;
            }

            Some(DateMatch {
                start: whole.start(),
                end: whole.end(),
                due: DueDate { token, date },
            })
        })
        .collect()
}

/// The next `weekday` on or after `from` (strictly after when `allow_today` is false).
fn next_weekday(from: NaiveDate, weekday: Weekday, allow_today: bool) -> NaiveDate {
    let current = from.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut ahead = (target - current).rem_euclid(7);
    if ahead == 0 && !allow_today {
        ahead = 7;
    }
    from + Duration::days(ahead)
}

/// Friday of the current week; on weekends, the following Friday.
fn end_of_week(from: NaiveDate) -> NaiveDate {
    next_weekday(from, Weekday::Fri, true)
}

/// `M/D` in the reference year, rolled into next year when already past.
fn month_day(month: u32, day: u32, reference: NaiveDate) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(reference.year(), month, day)?;
    if this_year >= reference {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(reference.year() + 1, month, day)
    }
}
