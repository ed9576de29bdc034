//! What each named job actually does.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::context::JobContext;
use super::job::{JobName, TriggerKind};
use crate::config::OrganizationConfig;
use crate::error::JobError;
use crate::model::{Event, ProjectScope, Task, TaskStatus};
use crate::pipeline::{EventBacklog, Pipeline};
use crate::reports::{ReportGenerator, ReportType, Timeframe};
use crate::store::{TaskFilter, TaskStore};

#[async_trait]
pub trait JobBody: Send + Sync {
    async fn run(&self, ctx: &JobContext) -> Result<Value, JobError>;
}

/// Drains the event backlog through the ingestion pipeline.
pub struct ExtractBatchBody {
    backlog: Arc<EventBacklog>,
    pipeline: Arc<Pipeline>,
    batch_size: usize,
}

impl ExtractBatchBody {
    pub fn new(backlog: Arc<EventBacklog>, pipeline: Arc<Pipeline>, batch_size: usize) -> Self {
        Self {
            backlog,
            pipeline,
            batch_size: batch_size.max(1),
        }
    }
}

/// Events drained for one run. Whatever the guard still holds when it is
/// dropped, after an error, timeout or panic, goes back to the front of the
/// backlog.
struct DrainedBatch<'a> {
    backlog: &'a EventBacklog,
    pending: VecDeque<(ProjectScope, Event)>,
}

impl Drop for DrainedBatch<'_> {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        log::warn!(
            "extract_batch stopped early, returning {} events to the backlog",
            self.pending.len()
        );
        self.backlog.requeue(self.pending.drain(..).collect());
    }
}

#[async_trait]
impl JobBody for ExtractBatchBody {
    async fn run(&self, ctx: &JobContext) -> Result<Value, JobError> {
        let mut batch = DrainedBatch {
            backlog: &self.backlog,
            pending: self.backlog.drain(self.batch_size).into(),
        };
        let total = batch.pending.len();
        let (mut created, mut merged, mut unchanged) = (0, 0, 0);

        // An event leaves the batch only once it has been ingested.
        while let Some((scope, event)) = batch.pending.front().cloned() {
            ctx.checkpoint()?;
            let outcome = ctx
                .call_external("task store", async {
                    self.pipeline
                        .ingest(&scope, &event)
                        .await
                        .map_err(JobError::from)
                })
                .await?;
            batch.pending.pop_front();
            created += outcome.created.len();
            merged += outcome.merged.len();
            unchanged += outcome.unchanged.len();
        }
        drop(batch);

        Ok(json!({
            "events": total,
            "created": created,
            "merged": merged,
            "unchanged": unchanged,
            "backlog_remaining": self.backlog.len(),
        }))
    }
}

/// Daily summary, weekly report and productivity analysis.
pub struct ReportBody {
    report_type: ReportType,
    timeframe: Timeframe,
    generator: Arc<ReportGenerator>,
    organizations: Vec<OrganizationConfig>,
}

impl ReportBody {
    /// `None` for jobs that are not reports.
    pub fn for_job(
        name: JobName,
        generator: Arc<ReportGenerator>,
        organizations: Vec<OrganizationConfig>,
    ) -> Option<Self> {
        let (report_type, timeframe) = match name {
            JobName::DailySummary => (ReportType::Daily, Timeframe::Daily),
            JobName::WeeklyReport => (ReportType::Weekly, Timeframe::Weekly),
            JobName::ProductivityAnalysis => (ReportType::Productivity, Timeframe::Weekly),
            JobName::NotionSync | JobName::ExtractBatch => return None,
        };
        Some(Self {
            report_type,
            timeframe,
            generator,
            organizations,
        })
    }

    fn targets(&self, ctx: &JobContext) -> Vec<(String, Option<String>)> {
        let params = ctx.params();
        if let Some(org_id) = &params.org_id {
            return vec![(org_id.clone(), params.project_id.clone())];
        }
        self.organizations
            .iter()
            .flat_map(|org| {
                std::iter::once((org.org_id.clone(), None)).chain(
                    org.projects
                        .iter()
                        .map(|project| (org.org_id.clone(), Some(project.clone()))),
                )
            })
            .collect()
    }
}

#[async_trait]
impl JobBody for ReportBody {
    async fn run(&self, ctx: &JobContext) -> Result<Value, JobError> {
        let (report_type, timeframe) = match ctx.params().days {
            Some(days) => {
                let timeframe = Timeframe::Days(days);
                (timeframe.report_type(), timeframe)
            }
            None => (self.report_type, self.timeframe),
        };
        // Scheduled runs skip periods that already have a report.
        let skip_existing = ctx.job().trigger_kind == TriggerKind::Scheduled;

        let mut generated = Vec::new();
        let mut skipped = 0;
        for (org_id, project_id) in self.targets(ctx) {
            ctx.checkpoint()?;
            let now = Utc::now();
            let report = ctx
                .call_external("report generation", async {
                    let project_id = project_id.as_deref();
                    let report = if skip_existing {
                        self.generator
                            .generate_if_missing(&org_id, project_id, report_type, timeframe, now)
                            .await
                    } else {
                        self.generator
                            .generate(&org_id, project_id, report_type, timeframe, now)
                            .await
                            .map(Some)
                    };
                    report.map_err(JobError::from)
                })
                .await?;
            match report {
                Some(report) => generated.push(json!({
                    "report_id": report.id,
                    "org_id": report.org_id,
                    "project_id": report.project_id,
                    "headline": report.summary.headline,
                })),
                None => skipped += 1,
            }
        }

        Ok(json!({
            "report_type": report_type,
            "days": timeframe.days(),
            "generated": generated,
            "skipped": skipped,
        }))
    }
}

/// External task board that mirrors the task store.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    fn name(&self) -> &str;

    /// Pushes `tasks` for one organization; returns how many were written.
    async fn push_tasks(&self, org_id: &str, tasks: &[Task]) -> Result<usize, JobError>;
}

pub struct NotionSyncBody {
    target: Option<Arc<dyn SyncTarget>>,
    store: Arc<dyn TaskStore>,
    organizations: Vec<OrganizationConfig>,
}

impl NotionSyncBody {
    pub fn new(
        target: Option<Arc<dyn SyncTarget>>,
        store: Arc<dyn TaskStore>,
        organizations: Vec<OrganizationConfig>,
    ) -> Self {
        Self {
            target,
            store,
            organizations,
        }
    }
}

#[async_trait]
impl JobBody for NotionSyncBody {
    async fn run(&self, ctx: &JobContext) -> Result<Value, JobError> {
        let Some(target) = &self.target else {
            return Err(JobError::ExternalCollaborator(
                "no sync target configured".to_string(),
            ));
        };

        let mut synced = 0;
        for org in &self.organizations {
            ctx.checkpoint()?;
            let filter = TaskFilter {
                statuses: vec![TaskStatus::Open, TaskStatus::InProgress],
                ..TaskFilter::org(&org.org_id, None)
            };
            let tasks = ctx
                .call_external("task store", async {
                    self.store.list(&filter).await.map_err(JobError::from)
                })
                .await?;
            if tasks.is_empty() {
                continue;
            }

            ctx.checkpoint()?;
            let written = ctx
                .call_external(target.name(), target.push_tasks(&org.org_id, &tasks))
                .await?;
            log::info!(
                "Synced {} of {} tasks for {} to {}",
                written,
                tasks.len(),
                org.org_id,
                target.name()
            );
            synced += written;
        }

        Ok(json!({ "target": target.name(), "synced": synced }))
    }
}
