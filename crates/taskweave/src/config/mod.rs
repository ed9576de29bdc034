pub mod loader;
pub mod schema;

pub use loader::{job_definitions, load_config, load_config_from_str};
pub use schema::{
    AiExtractionConfig, Config, DedupConfig, ExecutorConfig, ExtractionConfig, IngestConfig,
    JobConfig, LogFormat, LoggingConfig, OrganizationConfig, PriorityConfig, ReportsConfig,
    RetryConfig, SchedulerConfig, SimilarityKind, TriggerConfig,
};
