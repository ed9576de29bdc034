//! The assembled system: stores, ingestion pipeline, jobs and reports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{job_definitions, Config};
use crate::db::Database;
use crate::error::{JobError, Result, TaskweaveError};
use crate::extraction::{AnalysisResult, CompletionBackend, ExtractionEngine};
use crate::jobs::{
    Executor, ExtractBatchBody, Job, JobBody, JobName, JobParams, JobRegistry, NotionSyncBody,
    ReportBody, ScheduledJobInfo, Scheduler, SyncTarget,
};
use crate::model::{Event, EventSource, ProjectScope, Task, TaskStatus};
use crate::normalizer::{handshake_challenge, normalize};
use crate::pipeline::intake::IntakeItem;
use crate::pipeline::{spawn_ingest_loop, EventBacklog, IngestOutcome, Pipeline, WebhookAck, WebhookIntake};
use crate::reports::{ReportGenerator, ReportOutcome, Timeframe};
use crate::store::{
    InMemoryReportStore, InMemoryTaskStore, ReportStore, SqliteReportStore, SqliteTaskStore,
    TaskFilter, TaskStore,
};

/// Capacity of the webhook → ingestion loop channel.
const INTAKE_CAPACITY: usize = 256;

/// Optional collaborators plugged in before the service is assembled.
pub struct TaskWeaveBuilder {
    config: Config,
    task_store: Option<Arc<dyn TaskStore>>,
    report_store: Option<Arc<dyn ReportStore>>,
    completion_backend: Option<Arc<dyn CompletionBackend>>,
    sync_target: Option<Arc<dyn SyncTarget>>,
    bodies: HashMap<JobName, Arc<dyn JobBody>>,
}

impl TaskWeaveBuilder {
    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn report_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.report_store = Some(store);
        self
    }

    pub fn completion_backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.completion_backend = Some(backend);
        self
    }

    pub fn sync_target(mut self, target: Arc<dyn SyncTarget>) -> Self {
        self.sync_target = Some(target);
        self
    }

    /// Replaces the built-in body of `name`.
    pub fn job_body(mut self, name: JobName, body: Arc<dyn JobBody>) -> Self {
        self.bodies.insert(name, body);
        self
    }

    pub fn build(self) -> Result<TaskWeave> {
        let config = self.config;

        let (task_store, report_store) = match (self.task_store, self.report_store) {
            (Some(tasks), Some(reports)) => (tasks, reports),
            (tasks, reports) => {
                let (default_tasks, default_reports) = default_stores(&config)?;
                (
                    tasks.unwrap_or(default_tasks),
                    reports.unwrap_or(default_reports),
                )
            }
        };

        let mut engine = ExtractionEngine::new(&config.extraction, &config.priority);
        if let Some(backend) = self.completion_backend {
            engine = engine.with_completion_backend(backend, &config.extraction);
        }
        let pipeline = Arc::new(Pipeline::from_config(
            &config,
            Arc::new(engine),
            Arc::clone(&task_store),
        ));

        let backlog = Arc::new(EventBacklog::new(config.ingest.backlog_capacity));
        let generator = Arc::new(ReportGenerator::new(
            Arc::clone(&task_store),
            report_store,
            config.reports.top_open_tasks,
        ));

        let definitions = job_definitions(&config)?;
        let registry = Arc::new(JobRegistry::new());
        let mut executor = Executor::new(Arc::clone(&registry), &config.executor, &definitions);
        let mut bodies = self.bodies;
        for def in &definitions {
            let body = match bodies.remove(&def.name) {
                Some(body) => body,
                None => default_body(
                    def.name,
                    &config,
                    &backlog,
                    &pipeline,
                    &generator,
                    &task_store,
                    self.sync_target.clone(),
                ),
            };
            executor = executor.with_body(def.name, body);
        }
        let executor = Arc::new(executor);
        let scheduler = Arc::new(Scheduler::new(
            definitions,
            Arc::clone(&executor),
            Duration::from_millis(config.scheduler.tick_millis),
            Utc::now(),
        ));

        let scope = ProjectScope::new(
            &config.ingest.default_org_id,
            &config.ingest.default_project_id,
        );
        let (intake, intake_rx) = WebhookIntake::channel(scope.clone(), INTAKE_CAPACITY);

        Ok(TaskWeave {
            config,
            scope,
            tasks: task_store,
            pipeline,
            backlog,
            generator,
            registry,
            executor,
            scheduler,
            intake,
            intake_rx: Mutex::new(Some(intake_rx)),
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        })
    }
}

fn default_stores(config: &Config) -> Result<(Arc<dyn TaskStore>, Arc<dyn ReportStore>)> {
    match &config.database_path {
        Some(path) => {
            let db = Database::open(path)?;
            Ok((
                Arc::new(SqliteTaskStore::new(db.clone())),
                Arc::new(SqliteReportStore::new(db)),
            ))
        }
        None => {
            info!("No database_path configured, keeping tasks in memory");
            Ok((
                Arc::new(InMemoryTaskStore::new()),
                Arc::new(InMemoryReportStore::new()),
            ))
        }
    }
}

fn default_body(
    name: JobName,
    config: &Config,
    backlog: &Arc<EventBacklog>,
    pipeline: &Arc<Pipeline>,
    generator: &Arc<ReportGenerator>,
    tasks: &Arc<dyn TaskStore>,
    sync_target: Option<Arc<dyn SyncTarget>>,
) -> Arc<dyn JobBody> {
    let organizations = config.reports.organizations.clone();
    if let Some(body) = ReportBody::for_job(name, Arc::clone(generator), organizations.clone()) {
        return Arc::new(body);
    }
    match name {
        JobName::ExtractBatch => Arc::new(ExtractBatchBody::new(
            Arc::clone(backlog),
            Arc::clone(pipeline),
            config.ingest.batch_size,
        )),
        _ => Arc::new(NotionSyncBody::new(
            sync_target,
            Arc::clone(tasks),
            organizations,
        )),
    }
}

pub struct TaskWeave {
    config: Config,
    scope: ProjectScope,
    tasks: Arc<dyn TaskStore>,
    pipeline: Arc<Pipeline>,
    backlog: Arc<EventBacklog>,
    generator: Arc<ReportGenerator>,
    registry: Arc<JobRegistry>,
    executor: Arc<Executor>,
    scheduler: Arc<Scheduler>,
    intake: WebhookIntake,
    intake_rx: Mutex<Option<mpsc::Receiver<IntakeItem>>>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskWeave {
    pub fn builder(config: Config) -> TaskWeaveBuilder {
        TaskWeaveBuilder {
            config,
            task_store: None,
            report_store: None,
            completion_backend: None,
            sync_target: None,
            bodies: HashMap::new(),
        }
    }

    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn default_scope(&self) -> &ProjectScope {
        &self.scope
    }

    pub fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    pub fn backlog(&self) -> &Arc<EventBacklog> {
        &self.backlog
    }

    /// Webhook entry point: answers handshakes and acknowledges content
    /// before the ingestion loop started by [`start`](Self::start) handles it.
    pub fn intake(&self) -> &WebhookIntake {
        &self.intake
    }

    fn handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts the executor workers, the scheduler loop and the ingestion
    /// loop. Calling it again is a no-op.
    pub fn start(&self) {
        let rx = self
            .intake_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(rx) = rx else {
            return;
        };

        self.executor.start();
        let mut handles = self.handles();
        handles.push(tokio::spawn(
            Arc::clone(&self.scheduler).run(self.shutdown.child_token()),
        ));
        handles.push(spawn_ingest_loop(
            Arc::clone(&self.pipeline),
            rx,
            self.shutdown.child_token(),
        ));
        info!("TaskWeave started");
    }

    /// Stops the scheduler, drains the ingestion loop and waits for running
    /// jobs to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = self.handles().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        self.executor.shutdown().await;
        info!("TaskWeave stopped");
    }

    /// Normalizes and ingests one payload into the default scope.
    /// Handshakes and content-free payloads yield `None`.
    pub async fn submit_event(&self, source: EventSource, payload: &Value) -> Result<Option<Event>> {
        let scope = self.scope.clone();
        Ok(self
            .ingest_payload(&scope, source, payload)
            .await?
            .map(|(event, _)| event))
    }

    /// [`submit_event`](Self::submit_event) for an explicit scope, also
    /// returning what the event did to the task set.
    pub async fn ingest_payload(
        &self,
        scope: &ProjectScope,
        source: EventSource,
        payload: &Value,
    ) -> Result<Option<(Event, IngestOutcome)>> {
        let Some(event) = self.normalize_content(source, payload)? else {
            return Ok(None);
        };
        let outcome = self.pipeline.ingest(scope, &event).await?;
        Ok(Some((event, outcome)))
    }

    /// Normalizes a payload and leaves it for the next `extract_batch` run.
    pub fn queue_event(&self, source: EventSource, payload: &Value) -> Result<Option<Event>> {
        let Some(event) = self.normalize_content(source, payload)? else {
            return Ok(None);
        };
        if !self.backlog.push(self.scope.clone(), event.clone()) {
            return Err(TaskweaveError::BacklogFull {
                capacity: self.backlog.capacity(),
            });
        }
        Ok(Some(event))
    }

    fn normalize_content(&self, source: EventSource, payload: &Value) -> Result<Option<Event>> {
        if handshake_challenge(source, payload).is_some() {
            return Ok(None);
        }
        Ok(normalize(source, payload, Utc::now())?)
    }

    /// Webhook-style receive on the default scope.
    pub async fn receive_webhook(&self, source: EventSource, payload: &Value) -> Result<WebhookAck> {
        self.intake.receive(source, payload).await
    }

    pub fn analyze_text(&self, text: &str, source: EventSource) -> AnalysisResult {
        self.pipeline.engine().analyze_text(text, source)
    }

    /// Short timeframes are generated inline; anything longer than
    /// `reports.heavy_timeframe_days` is queued as a `weekly_report` job.
    pub async fn generate_report(
        &self,
        org_id: &str,
        project_id: Option<&str>,
        timeframe: Timeframe,
    ) -> Result<ReportOutcome> {
        let days = timeframe.days();
        if days > self.config.reports.heavy_timeframe_days {
            let params = JobParams {
                org_id: Some(org_id.to_string()),
                project_id: project_id.map(str::to_string),
                days: Some(days),
            };
            let job = self.scheduler.trigger_with(JobName::WeeklyReport, params)?;
            info!("Queued {}-day report for {} as job {}", days, org_id, job.id);
            return Ok(ReportOutcome::Queued(job));
        }

        let report = self
            .generator
            .generate(org_id, project_id, timeframe.report_type(), timeframe, Utc::now())
            .await?;
        Ok(ReportOutcome::Generated(report))
    }

    pub fn list_jobs(&self) -> Vec<ScheduledJobInfo> {
        self.scheduler.snapshot()
    }

    pub fn trigger_job(&self, name: &str) -> std::result::Result<Job, JobError> {
        self.scheduler.trigger(name)
    }

    pub fn get_job_status(&self, job_id: &str) -> std::result::Result<Job, JobError> {
        self.registry.get(job_id)
    }

    pub fn cancel_job(&self, job_id: &str) -> std::result::Result<Job, JobError> {
        self.executor.cancel(job_id)
    }

    /// Every job record, newest first.
    pub fn jobs(&self) -> Vec<Job> {
        self.registry.list()
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self.tasks.list(filter).await?)
    }

    pub async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<Task> {
        Ok(self.tasks.set_status(task_id, status, Utc::now()).await?)
    }
}
