//! SQLite-backed stores. Rows are converted to and from the domain types
//! here; SQL lives in `db::task_repo` / `db::report_repo`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{ReportStore, SimilarityQuery, TaskFilter, TaskStore};
use crate::db::report_repo::{self, ReportRow};
use crate::db::task_repo::{self, TaskQuery, TaskRow};
use crate::db::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::error::StoreError;
use crate::model::{DueDate, Priority, Task, TaskStatus};
use crate::reports::{Report, ReportPeriod, ReportType};

/// Runs a database call on the blocking pool so async workers stay free.
async fn blocking<F, T>(db: &Database, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| StoreError::Blocking(e.to_string()))?
}

fn decode<T, E: std::fmt::Display>(result: Result<T, E>) -> Result<T, StoreError> {
    result.map_err(|e| StoreError::Decode(e.to_string()))
}

fn priority_rank(priority: Priority) -> i64 {
    Priority::ALL
        .iter()
        .position(|p| *p == priority)
        .map(|idx| idx as i64)
        .unwrap_or(0)
}

fn task_to_row(task: &Task) -> Result<TaskRow, StoreError> {
    let origin_event_ids =
        serde_json::to_string(&task.origin_event_ids).map_err(DatabaseError::from)?;
    Ok(TaskRow {
        id: task.id.clone(),
        org_id: task.org_id.clone(),
        project_id: task.project_id.clone(),
        title: task.title.clone(),
        description: task.description.clone(),
        status: task.status.as_str().to_string(),
        priority: task.priority.as_str().to_string(),
        priority_rank: priority_rank(task.priority),
        source: task.source.as_str().to_string(),
        assignee: task.assignee.clone(),
        due_token: task.due_date.as_ref().map(|d| d.token.clone()),
        due_date: task
            .due_date
            .as_ref()
            .and_then(|d| d.date)
            .map(|d| d.format("%Y-%m-%d").to_string()),
        created_at: format_timestamp(task.created_at),
        updated_at: format_timestamp(task.updated_at),
        origin_event_ids,
    })
}

fn row_to_task(row: TaskRow) -> Result<Task, StoreError> {
    let due_date = match row.due_token {
        Some(token) => {
            let date = match row.due_date {
                Some(date) => Some(decode(NaiveDate::parse_from_str(&date, "%Y-%m-%d"))?),
                None => None,
            };
            Some(DueDate { token, date })
        }
        None => None,
    };
    let origin_event_ids: BTreeSet<String> =
        serde_json::from_str(&row.origin_event_ids).map_err(DatabaseError::from)?;

    Ok(Task {
        status: decode(row.status.parse::<TaskStatus>())?,
        priority: decode(row.priority.parse::<Priority>())?,
        source: decode(row.source.parse())?,
        created_at: decode(parse_timestamp(&row.created_at))?,
        updated_at: decode(parse_timestamp(&row.updated_at))?,
        id: row.id,
        org_id: row.org_id,
        project_id: row.project_id,
        title: row.title,
        description: row.description,
        assignee: row.assignee,
        due_date,
        origin_event_ids,
    })
}

fn rows_to_tasks(rows: Vec<TaskRow>) -> Result<Vec<Task>, StoreError> {
    rows.into_iter().map(row_to_task).collect()
}

const ACTIVE_STATUSES: [TaskStatus; 2] = [TaskStatus::Open, TaskStatus::InProgress];

#[derive(Clone)]
pub struct SqliteTaskStore {
    db: Database,
}

impl SqliteTaskStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, task: Task) -> Result<Task, StoreError> {
        let row = task_to_row(&task)?;
        blocking(&self.db, move |db| Ok(task_repo::insert(db, &row)?)).await?;
        Ok(task)
    }

    async fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let id = id.to_string();
        let row = blocking(&self.db, move |db| Ok(task_repo::find_by_id(db, &id)?)).await?;
        row.map(row_to_task).transpose()
    }

    async fn compare_and_update(
        &self,
        task: &Task,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let row = task_to_row(task)?;
        let expected = format_timestamp(expected_updated_at);
        let task_id = task.id.clone();

        blocking(&self.db, move |db| {
            if task_repo::compare_and_update(db, &row, &expected)? {
                return Ok(());
            }
            match task_repo::find_by_id(db, &row.id)? {
                Some(_) => Err(StoreError::Conflict { task_id }),
                None => Err(StoreError::NotFound(task_id)),
            }
        })
        .await
    }

    async fn find_similar(&self, query: &SimilarityQuery) -> Result<Vec<Task>, StoreError> {
        let query = query.clone();
        blocking(&self.db, move |db| {
            let recorded = task_repo::find_by_origin_event(
                db,
                &query.scope.org_id,
                &query.scope.project_id,
                &query.event_id,
            )?;
            let active = task_repo::query(
                db,
                &TaskQuery {
                    org_id: Some(query.scope.org_id.clone()),
                    project_id: Some(query.scope.project_id.clone()),
                    statuses: ACTIVE_STATUSES
                        .iter()
                        .map(|s| s.as_str().to_string())
                        .collect(),
                    updated_since: query.updated_since.map(format_timestamp),
                    limit: None,
                },
            )?;

            let mut seen = BTreeSet::new();
            let mut found = Vec::new();
            for task in rows_to_tasks(recorded)?
                .into_iter()
                .chain(rows_to_tasks(active)?)
            {
                if query.matches(&task) && seen.insert(task.id.clone()) {
                    found.push(task);
                }
            }
            found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
            found.truncate(query.limit);
            Ok(found)
        })
        .await
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let query = TaskQuery {
            org_id: filter.org_id.clone(),
            project_id: filter.project_id.clone(),
            statuses: filter
                .statuses
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            updated_since: filter.updated_since.map(format_timestamp),
            limit: filter.limit.map(|l| l as u64),
        };
        let rows = blocking(&self.db, move |db| Ok(task_repo::query(db, &query)?)).await?;
        rows_to_tasks(rows)
    }

    async fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let mut task = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let expected = task.updated_at;
        task.status = status;
        task.touch(now);
        self.compare_and_update(&task, expected).await?;
        Ok(task)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        blocking(&self.db, move |db| Ok(task_repo::delete(db, &id)?)).await
    }
}

fn report_to_row(report: &Report) -> Result<ReportRow, StoreError> {
    Ok(ReportRow {
        id: report.id.clone(),
        org_id: report.org_id.clone(),
        project_id: report.project_id.clone(),
        report_type: report.report_type.as_str().to_string(),
        period_start: format_timestamp(report.period.start),
        period_end: format_timestamp(report.period.end),
        generated_at: format_timestamp(report.generated_at),
        summary: serde_json::to_string(&report.summary).map_err(DatabaseError::from)?,
    })
}

fn row_to_report(row: ReportRow) -> Result<Report, StoreError> {
    Ok(Report {
        report_type: decode(row.report_type.parse::<ReportType>())?,
        period: ReportPeriod {
            start: decode(parse_timestamp(&row.period_start))?,
            end: decode(parse_timestamp(&row.period_end))?,
        },
        generated_at: decode(parse_timestamp(&row.generated_at))?,
        summary: serde_json::from_str(&row.summary).map_err(DatabaseError::from)?,
        id: row.id,
        org_id: row.org_id,
        project_id: row.project_id,
    })
}

#[derive(Clone)]
pub struct SqliteReportStore {
    db: Database,
}

impl SqliteReportStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn save_report(&self, report: &Report) -> Result<(), StoreError> {
        let row = report_to_row(report)?;
        blocking(&self.db, move |db| Ok(report_repo::insert(db, &row)?)).await
    }

    async fn get_report(&self, id: &str) -> Result<Option<Report>, StoreError> {
        let id = id.to_string();
        let row = blocking(&self.db, move |db| Ok(report_repo::find_by_id(db, &id)?)).await?;
        row.map(row_to_report).transpose()
    }

    async fn latest_report(
        &self,
        org_id: &str,
        project_id: Option<&str>,
        report_type: ReportType,
        since: DateTime<Utc>,
    ) -> Result<Option<Report>, StoreError> {
        let org_id = org_id.to_string();
        let project_id = project_id.map(str::to_string);
        let since = format_timestamp(since);
        let row = blocking(&self.db, move |db| {
            Ok(report_repo::find_latest(
                db,
                &org_id,
                project_id.as_deref(),
                report_type.as_str(),
                &since,
            )?)
        })
        .await?;
        row.map(row_to_report).transpose()
    }
}
