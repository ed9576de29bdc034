//! Arena of job records keyed by id.
//!
//! Anyone holding the registry can read; only the executor changes state.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::job::{Job, JobFailure, JobId, JobName, JobState};
use crate::error::JobError;

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(|poisoned| {
            log::warn!("job registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(|poisoned| {
            log::warn!("job registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn get(&self, id: &str) -> Result<Job, JobError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Newest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Most recently enqueued run of `name`.
    pub fn latest(&self, name: JobName) -> Option<Job> {
        self.read()
            .values()
            .filter(|job| job.name == name)
            .max_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn enqueue(&self, job: Job) {
        self.write().insert(job.id.clone(), job);
    }

    /// Moves a queued job to running. Returns `None` if the job is gone or
    /// was already picked up, so a job id runs at most once.
    pub(crate) fn try_start(&self, id: &str, now: DateTime<Utc>) -> Option<Job> {
        let mut jobs = self.write();
        let job = jobs.get_mut(id)?;
        if job.state != JobState::Queued {
            return None;
        }
        job.state = JobState::Running;
        job.started_at = Some(now);
        Some(job.clone())
    }

    pub(crate) fn record_attempt(&self, id: &str, attempt: u32) {
        if let Some(job) = self.write().get_mut(id) {
            job.attempts = attempt;
        }
    }

    /// Terminal transition. Finished jobs are never rewritten.
    pub(crate) fn finish(
        &self,
        id: &str,
        outcome: Result<serde_json::Value, JobError>,
        now: DateTime<Utc>,
    ) -> Option<Job> {
        let mut jobs = self.write();
        let job = jobs.get_mut(id)?;
        if job.state.is_terminal() {
            return None;
        }
        match outcome {
            Ok(value) => {
                job.state = JobState::Succeeded;
                job.result = Some(value);
            }
            Err(err) => {
                job.state = JobState::Failed;
                job.error = Some(JobFailure::from(&err));
            }
        }
        job.finished_at = Some(now);
        Some(job.clone())
    }

    /// Fails a job that no worker has picked up yet.
    pub(crate) fn cancel_queued(&self, id: &str, now: DateTime<Utc>) -> bool {
        let mut jobs = self.write();
        match jobs.get_mut(id) {
            Some(job) if job.state == JobState::Queued => {
                job.state = JobState::Failed;
                job.error = Some(JobFailure::from(&JobError::Cancelled));
                job.finished_at = Some(now);
                true
            }
            _ => false,
        }
    }
}
