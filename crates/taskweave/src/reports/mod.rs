//! Report records and the generator that builds them from task snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::Job;
use crate::model::{EventSource, Priority, TaskStatus};

pub mod generator;

pub use generator::ReportGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Daily,
    Weekly,
    Productivity,
    Custom,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Daily => "daily",
            ReportType::Weekly => "weekly",
            ReportType::Productivity => "productivity",
            ReportType::Custom => "custom",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(ReportType::Daily),
            "weekly" => Ok(ReportType::Weekly),
            "productivity" => Ok(ReportType::Productivity),
            "custom" => Ok(ReportType::Custom),
            other => Err(format!("unknown report type '{}'", other)),
        }
    }
}

/// Window a report covers, ending at generation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
    Days(u32),
}

impl Timeframe {
    pub fn days(&self) -> u32 {
        match self {
            Timeframe::Daily => 1,
            Timeframe::Weekly => 7,
            Timeframe::Monthly => 30,
            Timeframe::Days(n) => (*n).max(1),
        }
    }

    pub fn report_type(&self) -> ReportType {
        match self {
            Timeframe::Daily => ReportType::Daily,
            Timeframe::Weekly => ReportType::Weekly,
            Timeframe::Monthly | Timeframe::Days(_) => ReportType::Custom,
        }
    }

    pub fn period_ending(&self, end: DateTime<Utc>) -> ReportPeriod {
        ReportPeriod {
            start: end - Duration::days(i64::from(self.days())),
            end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportPeriod {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Short view of an open task for the "top open tasks" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBrief {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    pub assignee: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_tasks: usize,
    pub by_status: BTreeMap<TaskStatus, usize>,
    pub by_priority: BTreeMap<Priority, usize>,
    pub by_source: BTreeMap<EventSource, usize>,
    pub created_in_period: usize,
    pub completed_in_period: usize,
    /// Done tasks over all non-cancelled tasks, in `[0, 1]`.
    pub completion_rate: f64,
    pub top_open: Vec<TaskBrief>,
    pub headline: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub org_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub report_type: ReportType,
    pub period: ReportPeriod,
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
}

/// Short timeframes are generated inline; long ones are handed to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    Generated(Report),
    Queued(Job),
}
