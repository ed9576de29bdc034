//! Ingestion: event → extraction → scoring → dedup → task store write.

pub mod backlog;
pub mod intake;
pub mod runner;

pub use backlog::EventBacklog;
pub use intake::{spawn_ingest_loop, WebhookAck, WebhookIntake};
pub use runner::{IngestOutcome, Pipeline};
