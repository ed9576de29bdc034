use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, info_span, Instrument};

use super::{Report, ReportPeriod, ReportSummary, ReportType, TaskBrief, Timeframe};
use crate::error::StoreError;
use crate::model::{Task, TaskStatus};
use crate::store::{ReportStore, TaskFilter, TaskStore};

/// Builds reports from a read-only snapshot of the task store.
pub struct ReportGenerator {
    tasks: Arc<dyn TaskStore>,
    reports: Arc<dyn ReportStore>,
    top_open: usize,
}

impl ReportGenerator {
    pub fn new(tasks: Arc<dyn TaskStore>, reports: Arc<dyn ReportStore>, top_open: usize) -> Self {
        Self {
            tasks,
            reports,
            top_open,
        }
    }

    pub fn report_store(&self) -> &Arc<dyn ReportStore> {
        &self.reports
    }

    /// Builds and saves a report for the window ending at `now`.
    pub async fn generate(
        &self,
        org_id: &str,
        project_id: Option<&str>,
        report_type: ReportType,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Result<Report, StoreError> {
        let span = info_span!("report",
            org_id = %org_id,
            project_id = project_id.unwrap_or("*"),
            report_type = %report_type,
            days = timeframe.days(),
        );
        async {
            let tasks = self.tasks.list(&TaskFilter::org(org_id, project_id)).await?;
            let period = timeframe.period_ending(now);
            let report = Report {
                id: uuid::Uuid::new_v4().to_string(),
                org_id: org_id.to_string(),
                project_id: project_id.map(str::to_string),
                report_type,
                period,
                generated_at: now,
                summary: summarize(&tasks, &period, timeframe.days(), self.top_open),
            };
            self.reports.save_report(&report).await?;
            info!(report_id = %report.id, tasks = tasks.len(), "report generated");
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Like [`generate`](Self::generate), but returns `None` when a report of
    /// the same type already covers this period.
    pub async fn generate_if_missing(
        &self,
        org_id: &str,
        project_id: Option<&str>,
        report_type: ReportType,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Result<Option<Report>, StoreError> {
        // Tolerates an hour of drift between scheduled runs.
        let since = timeframe.period_ending(now).start + Duration::hours(1);
        if let Some(existing) = self
            .reports
            .latest_report(org_id, project_id, report_type, since)
            .await?
        {
            log::debug!(
                "Skipping {} report for {}: {} already covers this period",
                report_type,
                org_id,
                existing.id
            );
            return Ok(None);
        }
        self.generate(org_id, project_id, report_type, timeframe, now)
            .await
            .map(Some)
    }
}

/// Aggregates `tasks` over `period`. Pure, so report contents are testable
/// without a store.
pub fn summarize(tasks: &[Task], period: &ReportPeriod, days: u32, top_n: usize) -> ReportSummary {
    let mut summary = ReportSummary {
        total_tasks: tasks.len(),
        ..ReportSummary::default()
    };

    for task in tasks {
        *summary.by_status.entry(task.status).or_default() += 1;
        *summary.by_priority.entry(task.priority).or_default() += 1;
        *summary.by_source.entry(task.source).or_default() += 1;
        if period.contains(task.created_at) {
            summary.created_in_period += 1;
        }
        if task.status == TaskStatus::Done && period.contains(task.updated_at) {
            summary.completed_in_period += 1;
        }
    }

    let count = |status| summary.by_status.get(&status).copied().unwrap_or(0);
    let done = count(TaskStatus::Done);
    let considered = summary.total_tasks - count(TaskStatus::Cancelled);
    summary.completion_rate = if considered == 0 {
        0.0
    } else {
        done as f64 / considered as f64
    };

    let mut open: Vec<&Task> = tasks.iter().filter(|t| t.status.is_active()).collect();
    open.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    let open_count = open.len();
    let critical = open
        .iter()
        .filter(|t| t.priority == crate::model::Priority::Critical)
        .count();
    summary.top_open = open
        .into_iter()
        .take(top_n)
        .map(|t| TaskBrief {
            id: t.id.clone(),
            title: t.title.clone(),
            priority: t.priority,
            assignee: t.assignee.clone(),
        })
        .collect();

    summary.headline = format!(
        "{} new and {} completed in the last {} day{}; {} open ({} critical)",
        summary.created_in_period,
        summary.completed_in_period,
        days,
        if days == 1 { "" } else { "s" },
        open_count,
        critical,
    );
    summary
}
