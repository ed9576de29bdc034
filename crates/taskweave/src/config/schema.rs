use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::automation::AutomationRule;
use crate::jobs::JobName;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file for tasks and reports. Without one everything stays in memory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub priority: PriorityConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    /// Evaluated in order after every ingested event.
    #[serde(default)]
    pub automations: Vec<AutomationRule>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_org_id")]
    pub default_org_id: String,
    #[serde(default = "default_project_id")]
    pub default_project_id: String,
    /// Events drained from the backlog per `extract_batch` run.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_backlog_capacity")]
    pub backlog_capacity: usize,
}

fn default_org_id() -> String {
    "default_org".to_string()
}

fn default_project_id() -> String {
    "default_project".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_backlog_capacity() -> usize {
    10_000
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_org_id: default_org_id(),
            default_project_id: default_project_id(),
            batch_size: default_batch_size(),
            backlog_capacity: default_backlog_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_max_drafts")]
    pub max_drafts_per_event: usize,
    #[serde(default = "default_title_max_len")]
    pub title_max_len: usize,
    /// Messages shorter than this (in chars) become the description verbatim.
    #[serde(default = "default_short_message_len")]
    pub short_message_len: usize,
    /// Upper bound on any single strategy, AI backends included.
    #[serde(default = "default_strategy_timeout")]
    pub strategy_timeout_secs: u64,
    #[serde(default)]
    pub ai: AiExtractionConfig,
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_max_drafts() -> usize {
    5
}

fn default_title_max_len() -> usize {
    100
}

fn default_short_message_len() -> usize {
    200
}

fn default_strategy_timeout() -> u64 {
    30
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_drafts_per_event: default_max_drafts(),
            title_max_len: default_title_max_len(),
            short_message_len: default_short_message_len(),
            strategy_timeout_secs: default_strategy_timeout(),
            ai: AiExtractionConfig::default(),
        }
    }
}

/// Fallback to a completion backend when the rule pass finds nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiExtractionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_ai_min_confidence")]
    pub min_confidence: f32,
}

fn default_ai_timeout() -> u64 {
    20
}

fn default_ai_min_confidence() -> f32 {
    0.7
}

impl Default for AiExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: default_ai_timeout(),
            min_confidence: default_ai_min_confidence(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityKind {
    #[default]
    Jaccard,
    Overlap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f64,
    #[serde(default)]
    pub similarity: SimilarityKind,
    #[serde(default)]
    pub extra_stop_words: Vec<String>,
    #[serde(default = "default_max_merge_retries")]
    pub max_merge_retries: u32,
    #[serde(default = "default_candidate_window_days")]
    pub candidate_window_days: u32,
}

fn default_merge_threshold() -> f64 {
    0.6
}

fn default_max_merge_retries() -> u32 {
    1
}

fn default_candidate_window_days() -> u32 {
    30
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            merge_threshold: default_merge_threshold(),
            similarity: SimilarityKind::default(),
            extra_stop_words: Vec::new(),
            max_merge_retries: default_max_merge_retries(),
            candidate_window_days: default_candidate_window_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityConfig {
    #[serde(default = "default_critical_at")]
    pub critical_at: u32,
    #[serde(default = "default_high_at")]
    pub high_at: u32,
    #[serde(default = "default_medium_at")]
    pub medium_at: u32,
    #[serde(default = "default_urgency_keywords")]
    pub urgency_keywords: Vec<String>,
    /// Event labels that mark production-incident style work.
    #[serde(default = "default_incident_labels")]
    pub incident_labels: Vec<String>,
    /// Sources whose every event counts as incident-style.
    #[serde(default)]
    pub incident_sources: Vec<crate::model::EventSource>,
}

fn default_critical_at() -> u32 {
    4
}

fn default_high_at() -> u32 {
    2
}

fn default_medium_at() -> u32 {
    1
}

fn default_urgency_keywords() -> Vec<String> {
    ["urgent", "asap", "critical", "blocker"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_incident_labels() -> Vec<String> {
    vec!["bug".to_string(), "incident".to_string()]
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            critical_at: default_critical_at(),
            high_at: default_high_at(),
            medium_at: default_medium_at(),
            urgency_keywords: default_urgency_keywords(),
            incident_labels: default_incident_labels(),
            incident_sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerConfig {
    Interval { interval_secs: u64 },
    Cron { cron: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: JobName,
    pub trigger: TriggerConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Overrides `executor.job_timeout_secs` for this job.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl JobConfig {
    fn scheduled(name: JobName, trigger: TriggerConfig) -> Self {
        Self {
            name,
            trigger,
            enabled: true,
            retry: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    #[serde(default = "default_jobs")]
    pub jobs: Vec<JobConfig>,
}

fn default_tick_millis() -> u64 {
    1000
}

fn default_jobs() -> Vec<JobConfig> {
    let cron = |expr: &str| TriggerConfig::Cron {
        cron: expr.to_string(),
    };
    let every = |secs: u64| TriggerConfig::Interval {
        interval_secs: secs,
    };

    vec![
        JobConfig::scheduled(JobName::DailySummary, cron("0 18 * * *")),
        JobConfig::scheduled(JobName::WeeklyReport, cron("0 17 * * fri")),
        JobConfig::scheduled(JobName::ProductivityAnalysis, every(3 * 24 * 3600)),
        JobConfig::scheduled(JobName::NotionSync, every(2 * 3600)),
        JobConfig::scheduled(JobName::ExtractBatch, every(5 * 60)),
    ]
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            jobs: default_jobs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    #[serde(default = "default_external_call_timeout")]
    pub external_call_timeout_secs: u64,
}

fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

fn default_queue_capacity() -> usize {
    64
}

fn default_job_timeout() -> u64 {
    300
}

fn default_external_call_timeout() -> u64 {
    30
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            job_timeout_secs: default_job_timeout(),
            external_call_timeout_secs: default_external_call_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationConfig {
    pub org_id: String,
    /// Projects to report on individually, in addition to the org-wide report.
    #[serde(default)]
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_organizations")]
    pub organizations: Vec<OrganizationConfig>,
    /// Report requests spanning more days than this run as a background job.
    #[serde(default = "default_heavy_timeframe_days")]
    pub heavy_timeframe_days: u32,
    #[serde(default = "default_top_open_tasks")]
    pub top_open_tasks: usize,
}

fn default_organizations() -> Vec<OrganizationConfig> {
    vec![OrganizationConfig {
        org_id: default_org_id(),
        projects: Vec::new(),
    }]
}

fn default_heavy_timeframe_days() -> u32 {
    31
}

fn default_top_open_tasks() -> usize {
    5
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            organizations: default_organizations(),
            heavy_timeframe_days: default_heavy_timeframe_days(),
            top_open_tasks: default_top_open_tasks(),
        }
    }
}
