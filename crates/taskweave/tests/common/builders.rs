//! Builders for configs and integration payloads.

#![allow(dead_code)]

use std::path::PathBuf;

use serde_json::{json, Value};

use taskweave::config::{Config, JobConfig, RetryConfig, SimilarityKind, TriggerConfig};
use taskweave::JobName;

/// Builder for `Config` instances tuned for fast tests.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Defaults with two workers and a short scheduler tick.
    pub fn new() -> Self {
        let mut config = Config::default();
        config.executor.worker_count = 2;
        config.executor.job_timeout_secs = 30;
        config.scheduler.tick_millis = 50;
        Self { config }
    }

    pub fn merge_threshold(mut self, threshold: f64) -> Self {
        self.config.dedup.merge_threshold = threshold;
        self
    }

    pub fn similarity(mut self, kind: SimilarityKind) -> Self {
        self.config.dedup.similarity = kind;
        self
    }

    pub fn database(mut self, path: PathBuf) -> Self {
        self.config.database_path = Some(path);
        self
    }

    pub fn heavy_timeframe_days(mut self, days: u32) -> Self {
        self.config.reports.heavy_timeframe_days = days;
        self
    }

    pub fn external_call_timeout_secs(mut self, secs: u64) -> Self {
        self.config.executor.external_call_timeout_secs = secs;
        self
    }

    fn job_mut(&mut self, name: JobName) -> &mut JobConfig {
        let position = self
            .config
            .scheduler
            .jobs
            .iter()
            .position(|job| job.name == name);
        match position {
            Some(index) => &mut self.config.scheduler.jobs[index],
            None => {
                self.config.scheduler.jobs.push(JobConfig {
                    name,
                    trigger: TriggerConfig::Interval {
                        interval_secs: 3600,
                    },
                    enabled: true,
                    retry: None,
                    timeout_secs: None,
                });
                self.config
                    .scheduler
                    .jobs
                    .last_mut()
                    .expect("job was just pushed")
            }
        }
    }

    pub fn job_timeout_secs(mut self, name: JobName, secs: u64) -> Self {
        self.job_mut(name).timeout_secs = Some(secs);
        self
    }

    pub fn job_retry(mut self, name: JobName, max_attempts: u32) -> Self {
        self.job_mut(name).retry = Some(RetryConfig {
            max_attempts,
            backoff_secs: 0,
        });
        self
    }

    pub fn job_interval_secs(mut self, name: JobName, secs: u64) -> Self {
        self.job_mut(name).trigger = TriggerConfig::Interval {
            interval_secs: secs,
        };
        self
    }

    pub fn without_job(mut self, name: JobName) -> Self {
        self.config.scheduler.jobs.retain(|job| job.name != name);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Bare Slack message as delivered by the Events API inner `event`.
pub fn slack_message(text: &str, ts: &str) -> Value {
    json!({
        "type": "message",
        "channel": "C0123",
        "user": "U42",
        "text": text,
        "ts": ts,
    })
}

/// Slack Events API envelope around a message.
pub fn slack_envelope(text: &str, ts: &str) -> Value {
    json!({
        "type": "event_callback",
        "event": slack_message(text, ts),
    })
}

pub fn slack_handshake(challenge: &str) -> Value {
    json!({ "type": "url_verification", "challenge": challenge })
}

pub fn github_issue(repo: &str, number: u64, title: &str, body: &str) -> Value {
    json!({
        "action": "opened",
        "repository": { "full_name": repo },
        "issue": {
            "number": number,
            "title": title,
            "body": body,
            "labels": [],
            "created_at": "2026-03-02T09:00:00Z",
        },
    })
}

pub fn manual(id: &str, text: &str) -> Value {
    json!({ "id": id, "text": text })
}
