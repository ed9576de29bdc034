//! Test harness around a running `TaskWeave`.
//!
//! Each harness owns its own stores (in memory unless the config names a
//! database file) and a temporary directory for anything on disk.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use taskweave::config::Config;
use taskweave::store::TaskFilter;
use taskweave::{EventSource, Job, Task, TaskWeave, TaskWeaveBuilder};

use super::builders::{slack_message, ConfigBuilder};

pub struct TestHarness {
    pub service: TaskWeave,
    temp_dir: TempDir,
}

impl TestHarness {
    /// Started service with the test defaults.
    pub fn new() -> Self {
        Self::with_config(ConfigBuilder::new().build())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_builder(config, |builder| builder)
    }

    /// Lets a test swap in collaborators (job bodies, stores, sync target)
    /// before the service is started.
    pub fn with_builder(
        config: Config,
        customize: impl FnOnce(TaskWeaveBuilder) -> TaskWeaveBuilder,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let service = customize(TaskWeave::builder(config))
            .build()
            .expect("Failed to build service");
        service.start();
        Self { service, temp_dir }
    }

    pub fn temp_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub async fn submit_slack(&self, text: &str, ts: &str) {
        self.service
            .submit_event(EventSource::Slack, &slack_message(text, ts))
            .await
            .expect("Slack payload should be accepted");
    }

    pub async fn submit(&self, source: EventSource, payload: &Value) {
        self.service
            .submit_event(source, payload)
            .await
            .expect("Payload should be accepted");
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.service
            .list_tasks(&TaskFilter::default())
            .await
            .expect("Listing tasks should succeed")
    }

    /// Polls until the job reaches a terminal state.
    pub async fn wait_for_job(&self, job_id: &str, timeout: Duration) -> Job {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self
                .service
                .get_job_status(job_id)
                .expect("Job should exist");
            if job.state.is_terminal() {
                return job;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("Job {} still {} after {:?}", job_id, job.state, timeout);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Polls until `job_id` leaves the queue.
    pub async fn wait_until_running(&self, job_id: &str, timeout: Duration) -> Job {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self
                .service
                .get_job_status(job_id)
                .expect("Job should exist");
            if job.state != taskweave::JobState::Queued {
                return job;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("Job {} never started within {:?}", job_id, timeout);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn shutdown(self) {
        self.service.shutdown().await;
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
