use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::automation::AutomationEngine;
use crate::config::Config;
use crate::dedup::{Deduplicator, Resolution};
use crate::error::StoreError;
use crate::extraction::ExtractionEngine;
use crate::model::{Event, ProjectScope, Task, TaskDraft};
use crate::priority::{PriorityScorer, ScoreContext};
use crate::sanitize;
use crate::store::{SimilarityQuery, TaskStore};

/// Upper bound on candidates fetched per draft.
const CANDIDATE_LIMIT: usize = 200;

/// What one event did to the task set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub event_id: String,
    pub created: Vec<String>,
    pub merged: Vec<String>,
    /// Drafts whose event was already recorded on a task.
    pub unchanged: Vec<String>,
    pub drafts: usize,
    /// Automation rules that ran for this event.
    pub automations: Vec<String>,
}

impl IngestOutcome {
    fn new(event_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            ..Self::default()
        }
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &String> {
        self.created
            .iter()
            .chain(&self.merged)
            .chain(&self.unchanged)
    }
}

pub struct Pipeline {
    engine: Arc<ExtractionEngine>,
    scorer: PriorityScorer,
    dedup: Deduplicator,
    store: Arc<dyn TaskStore>,
    max_merge_retries: u32,
    candidate_window: Duration,
    automations: AutomationEngine,
}

impl Pipeline {
    pub fn from_config(config: &Config, engine: Arc<ExtractionEngine>, store: Arc<dyn TaskStore>) -> Self {
        Self::new(
            engine,
            PriorityScorer::new(config.priority.clone()),
            Deduplicator::new(&config.dedup),
            store,
            config.dedup.max_merge_retries,
            Duration::days(i64::from(config.dedup.candidate_window_days)),
        )
        .with_automations(AutomationEngine::new(config.automations.clone()))
    }

    pub fn new(
        engine: Arc<ExtractionEngine>,
        scorer: PriorityScorer,
        dedup: Deduplicator,
        store: Arc<dyn TaskStore>,
        max_merge_retries: u32,
        candidate_window: Duration,
    ) -> Self {
        Self {
            engine,
            scorer,
            dedup,
            store,
            max_merge_retries,
            candidate_window,
            automations: AutomationEngine::default(),
        }
    }

    pub fn with_automations(mut self, automations: AutomationEngine) -> Self {
        self.automations = automations;
        self
    }

    pub fn engine(&self) -> &ExtractionEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Extract, score, deduplicate and write every draft of one event.
    /// Only store failures surface; extraction problems yield no drafts.
    pub async fn ingest(&self, scope: &ProjectScope, event: &Event) -> Result<IngestOutcome, StoreError> {
        let span = info_span!("ingest",
            event_id = %event.id,
            source = %event.source,
            org_id = %scope.org_id,
            project_id = %scope.project_id,
            text_hash = %sanitize::hash_text(&event.raw_text),
        );
        self.ingest_inner(scope, event).instrument(span).await
    }

    async fn ingest_inner(&self, scope: &ProjectScope, event: &Event) -> Result<IngestOutcome, StoreError> {
        let drafts = self.engine.extract(event).await;
        let mut outcome = IngestOutcome::new(&event.id);
        outcome.drafts = drafts.len();

        let labels = event.labels();
        for draft in &drafts {
            let priority = self.scorer.score(
                &draft.scoring_text(),
                &ScoreContext {
                    due: draft.due_date.as_ref(),
                    source: event.source,
                    labels: &labels,
                    now: Utc::now(),
                },
            );
            self.resolve_draft(scope, event, draft, priority, &mut outcome)
                .await?;
        }

        if !self.automations.is_empty() {
            let touched: Vec<String> = outcome
                .created
                .iter()
                .chain(&outcome.merged)
                .cloned()
                .collect();
            outcome.automations = self
                .automations
                .apply(self.store.as_ref(), scope, event, &touched)
                .await;
        }

        info!(
            drafts = outcome.drafts,
            created = outcome.created.len(),
            merged = outcome.merged.len(),
            unchanged = outcome.unchanged.len(),
            "event ingested"
        );
        Ok(outcome)
    }

    async fn resolve_draft(
        &self,
        scope: &ProjectScope,
        event: &Event,
        draft: &TaskDraft,
        priority: crate::model::Priority,
        outcome: &mut IngestOutcome,
    ) -> Result<(), StoreError> {
        let mut retries = 0;
        loop {
            let now = Utc::now();
            let query = SimilarityQuery {
                scope: scope.clone(),
                event_id: event.id.clone(),
                keywords: self.dedup.keywords(draft),
                updated_since: Some(now - self.candidate_window),
                limit: CANDIDATE_LIMIT,
            };
            let candidates = self.store.find_similar(&query).await?;

            let merged = match self
                .dedup
                .resolve(draft, priority, &candidates, scope, event.source, now)
            {
                Resolution::AlreadyRecorded(task) => {
                    debug!(task_id = %task.id, "event already recorded");
                    outcome.unchanged.push(task.id);
                    return Ok(());
                }
                Resolution::Insert(task) => {
                    let task = self.store.insert(task).await?;
                    debug!(task_id = %task.id, priority = %task.priority, "created task");
                    outcome.created.push(task.id);
                    return Ok(());
                }
                Resolution::Merge(task) => task,
            };

            let Some(expected) = candidates
                .iter()
                .find(|c| c.id == merged.id)
                .map(|c| c.updated_at)
            else {
                return Err(StoreError::NotFound(merged.id));
            };

            match self.store.compare_and_update(&merged, expected).await {
                Ok(()) => {
                    debug!(task_id = %merged.id, "merged into task");
                    outcome.merged.push(merged.id);
                    return Ok(());
                }
                Err(StoreError::Conflict { task_id }) | Err(StoreError::NotFound(task_id))
                    if retries < self.max_merge_retries =>
                {
                    retries += 1;
                    warn!(task_id = %task_id, retries, "merge raced a concurrent update, deciding again");
                }
                Err(StoreError::Conflict { task_id }) | Err(StoreError::NotFound(task_id)) => {
                    warn!(task_id = %task_id, "merge still conflicting, inserting as new task");
                    let task = Task::from_draft(draft, scope, event.source, priority, Utc::now());
                    let task = self.store.insert(task).await?;
                    outcome.created.push(task.id);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::DateTime;

    use crate::config::{ExtractionConfig, PriorityConfig};
    use crate::model::{EventSource, Priority, TaskStatus};
    use crate::store::{InMemoryTaskStore, TaskFilter};

    fn pipeline_with(store: Arc<dyn TaskStore>) -> Pipeline {
        let config = Config::default();
        let engine = Arc::new(ExtractionEngine::new(
            &ExtractionConfig::default(),
            &PriorityConfig::default(),
        ));
        Pipeline::from_config(&config, engine, store)
    }

    fn scope() -> ProjectScope {
        ProjectScope::new("org", "proj")
    }

    fn slack(text: &str, external_id: &str) -> Event {
        Event::new(EventSource::Slack, text, Utc::now()).with_external_id(external_id)
    }

    #[tokio::test]
    async fn test_ingest_creates_one_task_per_clause() {
        let store = Arc::new(InMemoryTaskStore::new());
        let pipeline = pipeline_with(store.clone());
        let outcome = pipeline
            .ingest(&scope(), &slack("Fix the login bug and update the docs.", "m1"))
            .await
            .unwrap();
        assert_eq!(outcome.drafts, 2);
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let store = Arc::new(InMemoryTaskStore::new());
        let pipeline = pipeline_with(store.clone());
        let event = slack("Fix the login bug and update the docs.", "m1");

        pipeline.ingest(&scope(), &event).await.unwrap();
        let second = pipeline.ingest(&scope(), &event).await.unwrap();

        assert!(second.created.is_empty());
        assert_eq!(second.unchanged.len() + second.merged.len(), 2);
        let tasks = store.list(&TaskFilter::default()).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.origin_event_ids.len() == 1));
    }

    #[tokio::test]
    async fn test_restatement_from_another_source_merges() {
        let store = Arc::new(InMemoryTaskStore::new());
        let pipeline = pipeline_with(store.clone());
        pipeline
            .ingest(&scope(), &slack("Please fix the login bug", "m1"))
            .await
            .unwrap();
        let github = Event::new(EventSource::Github, "Fix the login bug", Utc::now())
            .with_external_id("acme/web/issue/1/opened");
        let outcome = pipeline.ingest(&scope(), &github).await.unwrap();

        assert_eq!(outcome.merged.len(), 1);
        let task = store.get(&outcome.merged[0]).await.unwrap().unwrap();
        assert_eq!(task.origin_event_ids.len(), 2);
        assert_eq!(task.status, TaskStatus::Open);
    }

    #[tokio::test]
    async fn test_priority_follows_each_drafts_own_sentence() {
        let store = Arc::new(InMemoryTaskStore::new());
        let pipeline = pipeline_with(store.clone());
        let text = "URGENT: fix the payment outage. Update the onboarding docs.";
        let suggested = pipeline.engine().analyze_text(text, EventSource::Manual);

        let event = Event::new(EventSource::Manual, text, Utc::now()).with_external_id("m3");
        pipeline.ingest(&scope(), &event).await.unwrap();

        let tasks = store.list(&TaskFilter::default()).await.unwrap();
        assert_eq!(tasks.len(), 2);
        let docs = tasks
            .iter()
            .find(|t| t.title == "Update the onboarding docs")
            .unwrap();
        let outage = tasks
            .iter()
            .find(|t| t.title == "Fix the payment outage")
            .unwrap();
        assert_eq!(docs.priority, Priority::Low);
        assert!(outage.priority >= Priority::High);

        let docs_draft = suggested
            .tasks
            .iter()
            .find(|d| d.title == docs.title)
            .unwrap();
        assert_eq!(docs_draft.suggested_priority, docs.priority);
    }

    #[tokio::test]
    async fn test_automation_rules_run_after_ingest() {
        let store = Arc::new(InMemoryTaskStore::new());
        let mut config = Config::default();
        config.automations = serde_json::from_value(serde_json::json!([
            {
                "name": "escalate-github",
                "trigger": { "source": "github", "kind": "issue" },
                "action": { "type": "raise_priority", "priority": "critical" }
            },
            {
                "name": "slack-only",
                "trigger": { "source": "slack" },
                "action": { "type": "create_task", "title": "Never for github" }
            }
        ]))
        .unwrap();
        let engine = Arc::new(ExtractionEngine::new(
            &ExtractionConfig::default(),
            &PriorityConfig::default(),
        ));
        let pipeline = Pipeline::from_config(&config, engine, store.clone());

        let github = Event::new(EventSource::Github, "Update the docs", Utc::now())
            .with_external_id("acme/web/issue/9/opened")
            .with_metadata("kind", "issue");
        let outcome = pipeline.ingest(&scope(), &github).await.unwrap();

        assert_eq!(outcome.automations, vec!["escalate-github".to_string()]);
        assert_eq!(store.len(), 1);
        let task = store.get(&outcome.created[0]).await.unwrap().unwrap();
        assert_eq!(task.priority, Priority::Critical);
    }

    #[tokio::test]
    async fn test_no_actionable_text_writes_nothing() {
        let store = Arc::new(InMemoryTaskStore::new());
        let pipeline = pipeline_with(store.clone());
        let outcome = pipeline
            .ingest(&scope(), &slack("lunch was great", "m2"))
            .await
            .unwrap();
        assert_eq!(outcome.drafts, 0);
        assert!(store.is_empty());
    }

    /// Store whose compare-and-update always loses the race.
    struct AlwaysConflicting {
        inner: InMemoryTaskStore,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl TaskStore for AlwaysConflicting {
        async fn insert(&self, task: Task) -> Result<Task, StoreError> {
            self.inner.insert(task).await
        }

        async fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
            self.inner.get(id).await
        }

        async fn compare_and_update(
            &self,
            task: &Task,
            _expected: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict {
                task_id: task.id.clone(),
            })
        }

        async fn find_similar(&self, query: &SimilarityQuery) -> Result<Vec<Task>, StoreError> {
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

    #[tokio::test]
    async fn test_conflict_retries_once_then_inserts() {
        let store = Arc::new(AlwaysConflicting {
            inner: InMemoryTaskStore::new(),
            attempts: AtomicU32::new(0),
        });
        let pipeline = pipeline_with(store.clone());
        pipeline
            .ingest(&scope(), &slack("Please fix the login bug", "m1"))
            .await
            .unwrap();

        let outcome = pipeline
            .ingest(&scope(), &slack("Fix the login bug", "m2"))
            .await
            .unwrap();

        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.created.len(), 1);
        assert!(outcome.merged.is_empty());
        assert_eq!(store.inner.len(), 2);
    }
}
