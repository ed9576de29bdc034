//! Background jobs: definitions, scheduler, executor and the record arena
//! pollers read from.

pub mod bodies;
pub mod context;
pub mod executor;
pub mod job;
pub mod registry;
pub mod schedule;
pub mod scheduler;

pub use bodies::{ExtractBatchBody, JobBody, NotionSyncBody, ReportBody, SyncTarget};
pub use context::JobContext;
pub use executor::Executor;
pub use job::{FailureKind, Job, JobFailure, JobId, JobName, JobParams, JobState, TriggerKind};
pub use registry::JobRegistry;
pub use schedule::{CronSchedule, JobDefinition, RetryPolicy, TriggerSpec};
pub use scheduler::{ScheduledJobInfo, Scheduler};
