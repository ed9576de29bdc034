//! Trigger specifications and next-fire computation.
//!
//! Cron expressions use the classic five fields `MIN HOUR DOM MON DOW`,
//! evaluated in UTC. Each field accepts `*`, `*/N`, `N`, `A-B`, `A-B/N` and
//! comma-separated lists of those. Day-of-week accepts `0-7` (0 and 7 are
//! Sunday) and three-letter names; month accepts three-letter names.

use std::fmt;
use std::time::Duration;

use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc,
};
use serde::{Serialize, Serializer};

use super::job::JobName;

/// How far ahead a cron search looks before giving up (e.g. `0 0 30 2 *`).
const CRON_SEARCH_DAYS: i64 = 366 * 5;

const WEEKDAYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];
const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: Vec<bool>,
    hours: Vec<bool>,
    days_of_month: Vec<bool>,
    months: Vec<bool>,
    days_of_week: Vec<bool>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, String> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(format!(
                "expected 5 fields (MIN HOUR DOM MON DOW), got {}",
                parts.len()
            ));
        }

        let minutes = parse_field(parts[0], 0, 59, &[])?;
        let hours = parse_field(parts[1], 0, 23, &[])?;
        let days_of_month = parse_field(parts[2], 1, 31, &[])?;
        let months = parse_field(parts[3], 1, 12, &MONTHS)?;
        let mut days_of_week = parse_field(parts[4], 0, 7, &WEEKDAYS)?;
        // 7 is an alias for Sunday
        if days_of_week[7] {
            days_of_week[0] = true;
        }
        days_of_week.truncate(7);

        Ok(Self {
            expression: expression.to_string(),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: parts[2] != "*",
            dow_restricted: parts[4] != "*",
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Standard cron rule: when both day fields are restricted a day matches
    /// if either does.
    fn day_matches(&self, date: NaiveDate) -> bool {
        if !self.months[date.month() as usize] {
            return false;
        }
        let dom = self.days_of_month[date.day() as usize];
        let dow = self.days_of_week[date.weekday().num_days_from_sunday() as usize];
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    fn first_time_from(&self, hour: u32, minute: u32) -> Option<(u32, u32)> {
        for h in hour..24 {
            if !self.hours[h as usize] {
                continue;
            }
            let start = if h == hour { minute } else { 0 };
            if let Some(m) = (start..60).find(|m| self.minutes[*m as usize]) {
                return Some((h, m));
            }
        }
        None
    }

    /// First matching minute strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + ChronoDuration::minutes(1);
        let mut date = start.date_naive();
        let (mut hour, mut minute) = (start.hour(), start.minute());

        for _ in 0..CRON_SEARCH_DAYS {
            if self.day_matches(date) {
                if let Some((h, m)) = self.first_time_from(hour, minute) {
                    let time = NaiveTime::from_hms_opt(h, m, 0)?;
                    return Some(Utc.from_utc_datetime(&date.and_time(time)));
                }
            }
            date = date.succ_opt()?;
            hour = 0;
            minute = 0;
        }
        None
    }
}

fn parse_value(token: &str, names: &[&str], offset: u32) -> Result<u32, String> {
    if let Ok(n) = token.parse::<u32>() {
        return Ok(n);
    }
    let lower = token.to_ascii_lowercase();
    names
        .iter()
        .position(|name| *name == lower)
        .map(|idx| idx as u32 + offset)
        .ok_or_else(|| format!("invalid value '{}'", token))
}

fn parse_field(field: &str, min: u32, max: u32, names: &[&str]) -> Result<Vec<bool>, String> {
    // Month names start at 1, weekday names at 0.
    let name_offset = if names.len() == 12 { 1 } else { 0 };
    let mut allowed = vec![false; max as usize + 1];

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{}'", step))?;
                if step == 0 {
                    return Err("step must be greater than zero".to_string());
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (
                parse_value(a, names, name_offset)?,
                parse_value(b, names, name_offset)?,
            )
        } else {
            let v = parse_value(range, names, name_offset)?;
            // "5/15" means "from 5 to the end, every 15"
            if part.contains('/') {
                (v, max)
            } else {
                (v, v)
            }
        };

        if lo < min || hi > max || lo > hi {
            return Err(format!("'{}' out of range {}-{}", part, min, max));
        }
        for v in (lo..=hi).step_by(step as usize) {
            allowed[v as usize] = true;
        }
    }

    Ok(allowed)
}

/// When a job fires on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSpec {
    Interval(Duration),
    Cron(CronSchedule),
}

impl TriggerSpec {
    pub fn every(period: Duration) -> Self {
        TriggerSpec::Interval(period)
    }

    pub fn cron(expression: &str) -> Result<Self, String> {
        CronSchedule::parse(expression).map(TriggerSpec::Cron)
    }

    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TriggerSpec::Interval(period) => {
                let period = ChronoDuration::from_std(*period).ok()?;
                after.checked_add_signed(period)
            }
            TriggerSpec::Cron(schedule) => schedule.next_after(after),
        }
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSpec::Interval(period) => write!(f, "every {}s", period.as_secs()),
            TriggerSpec::Cron(schedule) => write!(f, "cron '{}'", schedule.expression()),
        }
    }
}

impl Serialize for TriggerSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Retries apply to failed attempts only; a cancelled job is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    pub name: JobName,
    pub trigger: TriggerSpec,
    pub enabled: bool,
    pub retry: Option<RetryPolicy>,
    pub timeout: Duration,
}

impl JobDefinition {
    pub fn new(name: JobName, trigger: TriggerSpec, timeout: Duration) -> Self {
        Self {
            name,
            trigger,
            enabled: true,
            retry: None,
            timeout,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.map(|r| r.max_attempts.max(1)).unwrap_or(1)
    }
}
