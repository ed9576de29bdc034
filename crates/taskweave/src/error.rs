use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskweaveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Task store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Ingestion loop is not running")]
    IntakeClosed,

    #[error("Event backlog is full ({capacity} events)")]
    BacklogFull { capacity: usize },
}

impl TaskweaveError {
    /// True for failures caused by the caller (bad payload, unknown job name,
    /// unknown id). The HTTP layer maps these to 4xx responses.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            TaskweaveError::Normalize(_)
                | TaskweaveError::Job(JobError::UnknownJob(_))
                | TaskweaveError::Job(JobError::NotFound(_))
                | TaskweaveError::Store(StoreError::NotFound(_))
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid trigger for job '{job}': {reason}")]
    InvalidTrigger { job: String, reason: String },
}

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Malformed {source_name} payload: {reason}")]
    MalformedPayload { source_name: String, reason: String },

    #[error("Unsupported event source: {0}")]
    UnsupportedSource(String),
}

impl NormalizeError {
    pub fn malformed(source: crate::model::EventSource, reason: impl Into<String>) -> Self {
        NormalizeError::MalformedPayload {
            source_name: source.to_string(),
            reason: reason.into(),
        }
    }
}

/// Internal extraction failures. These never cross the Extraction Engine
/// boundary: the engine logs them and returns no drafts.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extraction strategy failed: {0}")]
    Strategy(String),

    #[error("Completion backend failed: {0}")]
    Backend(String),

    #[error("Failed to parse completion response: {0}")]
    ResponseParse(String),

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Task '{task_id}' was modified concurrently")]
    Conflict { task_id: String },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Failed to decode stored record: {0}")]
    Decode(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Blocking store call failed: {0}")]
    Blocking(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job queue closed")]
    QueueClosed,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("External collaborator failed: {0}")]
    ExternalCollaborator(String),

    #[error("cancelled")]
    Cancelled,

    #[error("Job body failed: {0}")]
    Body(String),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        JobError::ExternalCollaborator(format!("task store: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, TaskweaveError>;
