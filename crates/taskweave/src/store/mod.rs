//! Task and report persistence behind async traits.
//!
//! The pipeline and job bodies only see [`TaskStore`] and [`ReportStore`];
//! in-memory and SQLite implementations live next to them.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::dedup::words;
use crate::error::StoreError;
use crate::model::{ProjectScope, Task, TaskStatus};
use crate::reports::{Report, ReportType};

pub mod memory;
pub mod sqlite;

pub use memory::{InMemoryReportStore, InMemoryTaskStore};
pub use sqlite::{SqliteReportStore, SqliteTaskStore};

/// Candidate lookup for the deduplicator.
///
/// Returns every task in `scope` that already records `event_id`, plus active
/// tasks updated since `updated_since` sharing at least one keyword.
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
    pub scope: ProjectScope,
    pub event_id: String,
    pub keywords: BTreeSet<String>,
    pub updated_since: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl SimilarityQuery {
    pub fn matches(&self, task: &Task) -> bool {
        if task.org_id != self.scope.org_id || task.project_id != self.scope.project_id {
            return false;
        }
        if task.origin_event_ids.contains(&self.event_id) {
            return true;
        }
        if !task.status.is_active() {
            return false;
        }
        if self.updated_since.is_some_and(|since| task.updated_at < since) {
            return false;
        }
        words(&task.title)
            .chain(words(&task.description))
            .any(|word| self.keywords.contains(&word))
    }
}

/// Listing filter; `None` / empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub org_id: Option<String>,
    pub project_id: Option<String>,
    pub statuses: Vec<TaskStatus>,
    pub updated_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn org(org_id: &str, project_id: Option<&str>) -> Self {
        Self {
            org_id: Some(org_id.to_string()),
            project_id: project_id.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.org_id.as_ref().map_or(true, |org| *org == task.org_id)
            && self
                .project_id
                .as_ref()
                .map_or(true, |project| *project == task.project_id)
            && (self.statuses.is_empty() || self.statuses.contains(&task.status))
            && self.updated_since.map_or(true, |since| task.updated_at >= since)
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> Result<Task, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Task>, StoreError>;

    /// Writes `task` only if the stored copy's `updated_at` still equals
    /// `expected_updated_at`; otherwise fails with [`StoreError::Conflict`].
    async fn compare_and_update(
        &self,
        task: &Task,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn find_similar(&self, query: &SimilarityQuery) -> Result<Vec<Task>, StoreError>;

    /// Most recently updated first.
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;

    /// Status changes come from users, never from the pipeline.
    async fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError>;

    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn save_report(&self, report: &Report) -> Result<(), StoreError>;

    async fn get_report(&self, id: &str) -> Result<Option<Report>, StoreError>;

    /// Latest report of `report_type` for the org/project generated at or after `since`.
    async fn latest_report(
        &self,
        org_id: &str,
        project_id: Option<&str>,
        report_type: ReportType,
        since: DateTime<Utc>,
    ) -> Result<Option<Report>, StoreError>;
}
