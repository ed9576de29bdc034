use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::job::{Job, JobParams};
use crate::error::JobError;

/// Handle a job body gets for one attempt.
#[derive(Clone)]
pub struct JobContext {
    job: Job,
    cancel: CancellationToken,
    external_call_timeout: Duration,
}

impl JobContext {
    pub fn new(job: Job, cancel: CancellationToken, external_call_timeout: Duration) -> Self {
        Self {
            job,
            cancel,
            external_call_timeout,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn params(&self) -> &JobParams {
        &self.job.params
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Call between steps. Fails with [`JobError::Cancelled`] once the job
    /// has been cancelled.
    pub fn checkpoint(&self) -> Result<(), JobError> {
        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        Ok(())
    }

    /// Runs one external call to completion or until the external-call
    /// timeout elapses. Cancellation is not observed mid-call.
    pub async fn call_external<T, F>(&self, what: &str, call: F) -> Result<T, JobError>
    where
        F: Future<Output = Result<T, JobError>>,
    {
        match tokio::time::timeout(self.external_call_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "Job {} ({}): {} timed out after {:?}",
                    self.job.id,
                    self.job.name,
                    what,
                    self.external_call_timeout
                );
                Err(JobError::Timeout(self.external_call_timeout))
            }
        }
    }
}
