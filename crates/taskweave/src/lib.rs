pub mod automation;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod extraction;
pub mod jobs;
pub mod model;
pub mod normalizer;
pub mod pipeline;
pub mod priority;
pub mod reports;
pub mod sanitize;
pub mod service;
pub mod store;
pub mod telemetry;

pub use config::{load_config, Config};
pub use error::{
    ConfigError, ExtractionError, JobError, NormalizeError, Result, StoreError, TaskweaveError,
};
pub use extraction::{AnalysisResult, ExtractionEngine, ExtractionStrategy};
pub use jobs::{Job, JobName, JobState, ScheduledJobInfo};
pub use model::{Event, EventSource, Priority, ProjectScope, Task, TaskDraft, TaskStatus};
pub use pipeline::{IngestOutcome, Pipeline, WebhookAck};
pub use reports::{Report, ReportOutcome, Timeframe};
pub use service::{TaskWeave, TaskWeaveBuilder};
