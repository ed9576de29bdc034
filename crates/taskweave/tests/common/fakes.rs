//! Stand-in collaborators for timing-sensitive tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::Notify;

use taskweave::jobs::{JobBody, JobContext};
use taskweave::store::{InMemoryTaskStore, SimilarityQuery, TaskFilter, TaskStore};
use taskweave::{JobError, StoreError, Task, TaskStatus};

/// In-memory task store whose candidate lookup takes `delay`.
pub struct SlowTaskStore {
    inner: InMemoryTaskStore,
    delay: Duration,
}

impl SlowTaskStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryTaskStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl TaskStore for SlowTaskStore {
    async fn insert(&self, task: Task) -> Result<Task, StoreError> {
        self.inner.insert(task).await
    }

    async fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
        self.inner.get(id).await
    }

    async fn compare_and_update(
        &self,
        task: &Task,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.compare_and_update(task, expected_updated_at).await
    }

    async fn find_similar(&self, query: &SimilarityQuery) -> Result<Vec<Task>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_similar(query).await
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        self.inner.list(filter).await
    }

    async fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        self.inner.set_status(id, status, now).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }
}

/// Job body that finishes only after `open()` is called.
#[derive(Default)]
pub struct GatedBody {
    gate: Notify,
}

impl GatedBody {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl JobBody for GatedBody {
    async fn run(&self, ctx: &JobContext) -> Result<Value, JobError> {
        self.gate.notified().await;
        ctx.checkpoint()?;
        Ok(json!({ "job": ctx.job().name.as_str() }))
    }
}
