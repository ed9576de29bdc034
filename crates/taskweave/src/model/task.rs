use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::draft::{DueDate, TaskDraft, UNASSIGNED};
use super::event::EventSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Open and in-progress tasks can absorb new reports of the same work.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Open | TaskStatus::InProgress)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TaskStatus::Open),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// Ordered priority level; `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// Organization + project a task belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectScope {
    pub org_id: String,
    pub project_id: String,
}

impl ProjectScope {
    pub fn new(org_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            project_id: project_id.into(),
        }
    }
}

/// Persisted task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub org_id: String,
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub source: EventSource,
    pub assignee: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DueDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub origin_event_ids: BTreeSet<String>,
}

impl Task {
    /// Builds a fresh `open` task from a draft.
    pub fn from_draft(
        draft: &TaskDraft,
        scope: &ProjectScope,
        source: EventSource,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        let mut origin_event_ids = BTreeSet::new();
        origin_event_ids.insert(draft.source_event_id.clone());

        Self {
            id: Uuid::new_v4().to_string(),
            org_id: scope.org_id.clone(),
            project_id: scope.project_id.clone(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            status: TaskStatus::Open,
            priority,
            source,
            assignee: draft.assignee.clone(),
            due_date: draft.due_date.clone(),
            created_at: now,
            updated_at: now,
            origin_event_ids,
        }
    }

    /// Folds another report of the same work into this task. Status and
    /// title are left alone; priority only ever goes up.
    pub fn absorb(&mut self, draft: &TaskDraft, priority: Priority, now: DateTime<Utc>) {
        self.origin_event_ids.insert(draft.source_event_id.clone());
        self.priority = self.priority.max(priority);
        if self.assignee == UNASSIGNED && draft.is_assigned() {
            self.assignee = draft.assignee.clone();
        }
        if self.due_date.is_none() {
            self.due_date = draft.due_date.clone();
        }
        self.touch(now);
    }

    /// Advances `updated_at`, strictly, so it can serve as a CAS token.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
    }

    pub fn scope(&self) -> ProjectScope {
        ProjectScope::new(&self.org_id, &self.project_id)
    }
}
