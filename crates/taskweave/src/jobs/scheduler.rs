//! Fires registered jobs on their triggers and on request.
//!
//! The scheduler only enqueues; every run goes through the [`Executor`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::executor::Executor;
use super::job::{Job, JobId, JobName, JobParams, JobState, TriggerKind};
use super::registry::JobRegistry;
use super::schedule::{JobDefinition, TriggerSpec};
use crate::error::JobError;

/// One row of the read-only registry view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledJobInfo {
    pub name: JobName,
    pub trigger: TriggerSpec,
    pub enabled: bool,
    pub next_run: Option<DateTime<Utc>>,
    pub last_state: Option<JobState>,
    pub last_job_id: Option<JobId>,
}

pub struct Scheduler {
    definitions: Vec<JobDefinition>,
    next_fire: Mutex<HashMap<JobName, Option<DateTime<Utc>>>>,
    executor: Arc<Executor>,
    registry: Arc<JobRegistry>,
    tick_period: Duration,
}

impl Scheduler {
    pub fn new(
        definitions: Vec<JobDefinition>,
        executor: Arc<Executor>,
        tick_period: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let next_fire = definitions
            .iter()
            .map(|def| {
                let next = if def.enabled {
                    def.trigger.next_fire(now)
                } else {
                    None
                };
                (def.name, next)
            })
            .collect();
        let registry = Arc::clone(executor.registry());
        Self {
            definitions,
            next_fire: Mutex::new(next_fire),
            executor,
            registry,
            tick_period,
        }
    }

    fn next_fire(&self) -> MutexGuard<'_, HashMap<JobName, Option<DateTime<Utc>>>> {
        self.next_fire.lock().unwrap_or_else(|poisoned| {
            log::warn!("scheduler lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn definition(&self, name: JobName) -> Option<&JobDefinition> {
        self.definitions.iter().find(|def| def.name == name)
    }

    /// Enqueues one job for every definition whose fire time has passed and
    /// computes its next fire time from `now`. Missed fires collapse into one.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<Job> {
        let mut due = Vec::new();
        {
            let mut next_fire = self.next_fire();
            for def in self.definitions.iter().filter(|def| def.enabled) {
                let fires = next_fire
                    .get(&def.name)
                    .copied()
                    .flatten()
                    .is_some_and(|at| at <= now);
                if fires {
                    next_fire.insert(def.name, def.trigger.next_fire(now));
                    due.push(def.name);
                }
            }
        }

        let mut fired = Vec::with_capacity(due.len());
        for name in due {
            let job = Job::queued(name, TriggerKind::Scheduled, JobParams::default(), now);
            match self.executor.submit(job) {
                Ok(job) => {
                    log::info!("Scheduled job {} fired as {}", name, job.id);
                    fired.push(job);
                }
                Err(e) => log::error!("Failed to enqueue scheduled job {}: {}", name, e),
            }
        }
        fired
    }

    /// Manual run of a registered job, regardless of its schedule.
    pub fn trigger(&self, name: &str) -> Result<Job, JobError> {
        let name: JobName = name.parse()?;
        self.trigger_with(name, JobParams::default())
    }

    pub fn trigger_with(&self, name: JobName, params: JobParams) -> Result<Job, JobError> {
        if self.definition(name).is_none() || !self.executor.has_body(name) {
            return Err(JobError::UnknownJob(name.to_string()));
        }
        let job = Job::queued(name, TriggerKind::Manual, params, Utc::now());
        let job = self.executor.submit(job)?;
        log::info!("Manually triggered job {} as {}", name, job.id);
        Ok(job)
    }

    pub fn snapshot(&self) -> Vec<ScheduledJobInfo> {
        let next_fire = self.next_fire();
        self.definitions
            .iter()
            .map(|def| {
                let last = self.registry.latest(def.name);
                ScheduledJobInfo {
                    name: def.name,
                    trigger: def.trigger.clone(),
                    enabled: def.enabled,
                    next_run: next_fire.get(&def.name).copied().flatten(),
                    last_state: last.as_ref().map(|job| job.state),
                    last_job_id: last.map(|job| job.id),
                }
            })
            .collect()
    }

    /// Ticks on a fixed period until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!(
            "Scheduler started with {} jobs, tick every {:?}",
            self.definitions.len(),
            self.tick_period
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now());
                }
                _ = shutdown.cancelled() => {
                    log::info!("Scheduler shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use serde_json::{json, Value};

    use crate::config::ExecutorConfig;
    use crate::jobs::bodies::JobBody;
    use crate::jobs::context::JobContext;

    struct Noop;

    #[async_trait]
    impl JobBody for Noop {
        async fn run(&self, _ctx: &JobContext) -> Result<Value, JobError> {
            Ok(json!({}))
        }
    }

    fn scheduler(now: DateTime<Utc>) -> Scheduler {
        let definitions = vec![
            JobDefinition::new(
                JobName::ExtractBatch,
                TriggerSpec::every(Duration::from_secs(300)),
                Duration::from_secs(10),
            ),
            JobDefinition::new(
                JobName::DailySummary,
                TriggerSpec::cron("0 18 * * *").unwrap(),
                Duration::from_secs(10),
            ),
        ];
        let registry = Arc::new(JobRegistry::new());
        let executor = Executor::new(registry, &ExecutorConfig::default(), &definitions)
            .with_body(JobName::ExtractBatch, Arc::new(Noop))
            .with_body(JobName::DailySummary, Arc::new(Noop));
        Scheduler::new(definitions, Arc::new(executor), Duration::from_secs(1), now)
    }

    #[tokio::test]
    async fn test_tick_fires_due_jobs_once() {
        let start = Utc::now();
        let scheduler = scheduler(start);
        assert!(scheduler.tick(start).is_empty());

        let later = start + ChronoDuration::seconds(301);
        let fired = scheduler.tick(later);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].name, JobName::ExtractBatch);
        assert_eq!(fired[0].trigger_kind, TriggerKind::Scheduled);
        assert!(scheduler.tick(later).is_empty());

        let info = scheduler
            .snapshot()
            .into_iter()
            .find(|i| i.name == JobName::ExtractBatch)
            .unwrap();
        assert_eq!(info.next_run, Some(later + ChronoDuration::seconds(300)));
        assert_eq!(info.last_state, Some(JobState::Queued));
    }

    #[tokio::test]
    async fn test_long_gap_collapses_missed_fires() {
        let start = Utc::now();
        let scheduler = scheduler(start);
        let fired = scheduler.tick(start + ChronoDuration::hours(3));
        assert_eq!(
            fired
                .iter()
                .filter(|j| j.name == JobName::ExtractBatch)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_manual_trigger() {
        let scheduler = scheduler(Utc::now());
        let job = scheduler.trigger("daily_summary").unwrap();
        assert_eq!(job.trigger_kind, TriggerKind::Manual);
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(scheduler.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_or_unregistered_name_creates_nothing() {
        let scheduler = scheduler(Utc::now());
        assert_eq!(
            scheduler.trigger("unknown_name").unwrap_err(),
            JobError::UnknownJob("unknown_name".to_string())
        );
        assert_eq!(
            scheduler.trigger("notion_sync").unwrap_err(),
            JobError::UnknownJob("notion_sync".to_string())
        );
        assert!(scheduler.registry.is_empty());
    }

    #[test]
    fn test_snapshot_lists_every_definition() {
        let now = Utc::now();
        let scheduler = scheduler(now);
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|i| i.last_state.is_none()));
        let daily = snapshot
            .iter()
            .find(|i| i.name == JobName::DailySummary)
            .unwrap();
        assert!(daily.next_run.unwrap() > now);
        let json = serde_json::to_value(daily).unwrap();
        assert_eq!(json["trigger"], "cron '0 18 * * *'");
    }
}
