//! Job records as seen by pollers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;

pub type JobId = String;

/// Every job body the scheduler knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobName {
    DailySummary,
    WeeklyReport,
    ProductivityAnalysis,
    NotionSync,
    ExtractBatch,
}

impl JobName {
    pub const ALL: [JobName; 5] = [
        JobName::DailySummary,
        JobName::WeeklyReport,
        JobName::ProductivityAnalysis,
        JobName::NotionSync,
        JobName::ExtractBatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::DailySummary => "daily_summary",
            JobName::WeeklyReport => "weekly_report",
            JobName::ProductivityAnalysis => "productivity_analysis",
            JobName::NotionSync => "notion_sync",
            JobName::ExtractBatch => "extract_batch",
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobName {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| JobError::UnknownJob(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ExternalCollaborator,
    Cancelled,
    Body,
    Internal,
}

/// Error detail captured on a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&JobError> for JobFailure {
    fn from(err: &JobError) -> Self {
        let kind = match err {
            JobError::Timeout(_) => FailureKind::Timeout,
            JobError::ExternalCollaborator(_) => FailureKind::ExternalCollaborator,
            JobError::Cancelled => FailureKind::Cancelled,
            JobError::Body(_) => FailureKind::Body,
            JobError::UnknownJob(_) | JobError::NotFound(_) | JobError::QueueClosed => {
                FailureKind::Internal
            }
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Optional arguments for a job run. Scheduled runs use the defaults; report
/// requests for long timeframes fill these in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: JobName,
    pub trigger_kind: TriggerKind,
    pub state: JobState,
    pub enqueued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub attempts: u32,
    #[serde(default)]
    pub params: JobParams,
}

impl Job {
    pub(crate) fn queued(
        name: JobName,
        trigger_kind: TriggerKind,
        params: JobParams,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            trigger_kind,
            state: JobState::Queued,
            enqueued_at: now,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            attempts: 0,
            params,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.kind == FailureKind::Cancelled)
    }
}
