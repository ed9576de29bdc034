//! In-memory stores backed by `RwLock<HashMap>`.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ReportStore, SimilarityQuery, TaskFilter, TaskStore};
use crate::error::StoreError;
use crate::model::{Task, TaskStatus};
use crate::reports::{Report, ReportType};

// A poisoned lock only means another thread panicked mid-operation; every
// write below replaces whole records, so the map is still consistent.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        log::warn!("store lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        log::warn!("store lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        read(&self.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<Task, StoreError> {
        write(&self.tasks).insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(read(&self.tasks).get(id).cloned())
    }

    async fn compare_and_update(
        &self,
        task: &Task,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tasks = write(&self.tasks);
        let stored = tasks
            .get_mut(&task.id)
            .ok_or_else(|| StoreError::NotFound(task.id.clone()))?;
        if stored.updated_at != expected_updated_at {
            return Err(StoreError::Conflict {
                task_id: task.id.clone(),
            });
        }
        *stored = task.clone();
        Ok(())
    }

    async fn find_similar(&self, query: &SimilarityQuery) -> Result<Vec<Task>, StoreError> {
        let mut found: Vec<Task> = read(&self.tasks)
            .values()
            .filter(|task| query.matches(task))
            .cloned()
            .collect();
        newest_first(&mut found);
        found.truncate(query.limit);
        Ok(found)
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut found: Vec<Task> = read(&self.tasks)
            .values()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect();
        newest_first(&mut found);
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let mut tasks = write(&self.tasks);
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.status = status;
        task.touch(now);
        Ok(task.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(write(&self.tasks).remove(id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryReportStore {
    reports: RwLock<Vec<Report>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn save_report(&self, report: &Report) -> Result<(), StoreError> {
        write(&self.reports).push(report.clone());
        Ok(())
    }

    async fn get_report(&self, id: &str) -> Result<Option<Report>, StoreError> {
        Ok(read(&self.reports).iter().find(|r| r.id == id).cloned())
    }

    async fn latest_report(
        &self,
        org_id: &str,
        project_id: Option<&str>,
        report_type: ReportType,
        since: DateTime<Utc>,
    ) -> Result<Option<Report>, StoreError> {
        Ok(read(&self.reports)
            .iter()
            .filter(|r| {
                r.org_id == org_id
                    && r.project_id.as_deref() == project_id
                    && r.report_type == report_type
                    && r.generated_at >= since
            })
            .max_by_key(|r| r.generated_at)
            .cloned())
    }
}
