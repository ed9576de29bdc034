use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::automation::AutomationAction;
use crate::config::schema::{Config, JobConfig, TriggerConfig};
use crate::error::ConfigError;
use crate::jobs::{JobDefinition, RetryPolicy, TriggerSpec};

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Builds the scheduler's job definitions from the `scheduler.jobs` section.
/// Disabled jobs are kept so that manual triggers still find them.
pub fn job_definitions(config: &Config) -> Result<Vec<JobDefinition>, ConfigError> {
    config
        .scheduler
        .jobs
        .iter()
        .map(|job| job_definition(job, config.executor.job_timeout_secs))
        .collect()
}

fn job_definition(job: &JobConfig, default_timeout_secs: u64) -> Result<JobDefinition, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidTrigger {
        job: job.name.to_string(),
        reason,
    };

    let trigger = match &job.trigger {
        TriggerConfig::Interval { interval_secs: 0 } => {
            return Err(invalid("interval must be greater than zero".to_string()))
        }
        TriggerConfig::Interval { interval_secs } => {
            TriggerSpec::every(Duration::from_secs(*interval_secs))
        }
        TriggerConfig::Cron { cron } => TriggerSpec::cron(cron).map_err(invalid)?,
    };

    let timeout_secs = job.timeout_secs.unwrap_or(default_timeout_secs);
    if timeout_secs == 0 {
        return Err(invalid("timeout must be greater than zero".to_string()));
    }

    let mut definition = JobDefinition::new(job.name, trigger, Duration::from_secs(timeout_secs));
    definition.enabled = job.enabled;
    if let Some(retry) = job.retry {
        if retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1".to_string()));
        }
        definition = definition.with_retry(RetryPolicy {
            max_attempts: retry.max_attempts,
            backoff: Duration::from_secs(retry.backoff_secs),
        });
    }

    Ok(definition)
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let extraction = &config.extraction;
    if !(0.0..=1.0).contains(&extraction.confidence_threshold) {
        return Err(validation(format!(
            "extraction.confidence_threshold must be within [0, 1], got {}",
            extraction.confidence_threshold
        )));
    }
    if !(0.0..=1.0).contains(&extraction.ai.min_confidence) {
        return Err(validation(format!(
            "extraction.ai.min_confidence must be within [0, 1], got {}",
            extraction.ai.min_confidence
        )));
    }
    if extraction.max_drafts_per_event == 0 || extraction.title_max_len == 0 {
        return Err(validation(
            "extraction.max_drafts_per_event and extraction.title_max_len must be positive",
        ));
    }

    if !(0.0..=1.0).contains(&config.dedup.merge_threshold) {
        return Err(validation(format!(
            "dedup.merge_threshold must be within [0, 1], got {}",
            config.dedup.merge_threshold
        )));
    }

    let priority = &config.priority;
    if !(priority.medium_at >= 1
        && priority.medium_at <= priority.high_at
        && priority.high_at <= priority.critical_at)
    {
        return Err(validation(format!(
            "priority cutoffs must satisfy 1 <= medium_at <= high_at <= critical_at, got {}/{}/{}",
            priority.medium_at, priority.high_at, priority.critical_at
        )));
    }

    if config.executor.worker_count == 0 {
        return Err(validation("executor.worker_count must be at least 1"));
    }
    if config.executor.queue_capacity == 0 {
        return Err(validation("executor.queue_capacity must be at least 1"));
    }
    if config.scheduler.tick_millis == 0 {
        return Err(validation("scheduler.tick_millis must be at least 1"));
    }
    if config.ingest.batch_size == 0 || config.ingest.backlog_capacity == 0 {
        return Err(validation(
            "ingest.batch_size and ingest.backlog_capacity must be positive",
        ));
    }

    let mut names = HashSet::new();
    for job in &config.scheduler.jobs {
        if !names.insert(job.name) {
            return Err(ConfigError::InvalidTrigger {
                job: job.name.to_string(),
                reason: "Duplicate job name".to_string(),
            });
        }
    }
    job_definitions(config)?;

    let mut orgs = HashSet::new();
    for org in &config.reports.organizations {
        if org.org_id.trim().is_empty() || !orgs.insert(org.org_id.as_str()) {
            return Err(validation(format!(
                "reports.organizations contains an empty or duplicate org_id '{}'",
                org.org_id
            )));
        }
    }

    let mut rules = HashSet::new();
    for rule in &config.automations {
        if rule.name.trim().is_empty() || !rules.insert(rule.name.as_str()) {
            return Err(validation(format!(
                "automations contains an empty or duplicate rule name '{}'",
                rule.name
            )));
        }
        if let AutomationAction::CreateTask { title, .. } = &rule.action {
            if title.trim().is_empty() {
                return Err(validation(format!(
                    "automation '{}' creates a task without a title",
                    rule.name
                )));
            }
        }
    }

    Ok(())
}
