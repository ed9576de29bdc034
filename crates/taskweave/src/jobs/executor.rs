//! Worker pool that runs queued jobs.
//!
//! Jobs arrive over a bounded channel as ids; their records live in the
//! [`JobRegistry`]. A worker claims a job with a queued→running transition on
//! the record, so an id that reaches the channel twice still runs once.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use super::bodies::JobBody;
use super::context::JobContext;
use super::job::{Job, JobId, JobName};
use super::registry::JobRegistry;
use super::schedule::JobDefinition;
use crate::config::ExecutorConfig;
use crate::error::JobError;

pub struct Executor {
    registry: Arc<JobRegistry>,
    bodies: HashMap<JobName, Arc<dyn JobBody>>,
    definitions: HashMap<JobName, JobDefinition>,
    worker_count: usize,
    job_timeout: Duration,
    external_call_timeout: Duration,
    tx: mpsc::Sender<JobId>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<JobId>>>,
    cancels: Mutex<HashMap<JobId, CancellationToken>>,
    accepting: AtomicBool,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    pub fn new(
        registry: Arc<JobRegistry>,
        config: &ExecutorConfig,
        definitions: &[JobDefinition],
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            registry,
            bodies: HashMap::new(),
            definitions: definitions
                .iter()
                .map(|def| (def.name, def.clone()))
                .collect(),
            worker_count: config.worker_count.max(1),
            job_timeout: Duration::from_secs(config.job_timeout_secs),
            external_call_timeout: Duration::from_secs(config.external_call_timeout_secs),
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            cancels: Mutex::new(HashMap::new()),
            accepting: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_body(mut self, name: JobName, body: Arc<dyn JobBody>) -> Self {
        self.bodies.insert(name, body);
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn has_body(&self, name: JobName) -> bool {
        self.bodies.contains_key(&name)
    }

    fn cancels(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.cancels.lock().unwrap_or_else(|poisoned| {
            warn!("executor cancel table lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(|poisoned| {
            warn!("executor worker list lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Spawns the worker tasks. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers();
        if !workers.is_empty() {
            return;
        }
        for worker_id in 0..self.worker_count {
            let executor = Arc::clone(self);
            workers.push(tokio::spawn(executor.worker_loop(worker_id)));
        }
        info!("Job executor started with {} workers", self.worker_count);
    }

    /// Stops accepting jobs, lets running jobs finish and waits for the
    /// workers. Jobs still queued stay `queued` in the registry.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = self.workers().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Job worker ended abnormally: {}", e);
            }
        }
        info!("Job executor stopped");
    }

    /// Records `job` as queued and hands it to the workers.
    pub(crate) fn submit(&self, job: Job) -> Result<Job, JobError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(JobError::QueueClosed);
        }
        let id = job.id.clone();
        self.cancels().insert(id.clone(), CancellationToken::new());
        self.registry.enqueue(job.clone());

        match self.tx.try_send(id) {
            Ok(()) => {}
            Err(TrySendError::Full(id)) => {
                debug!("Job queue full, job {} waits for a free slot", id);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if tx.send(id).await.is_err() {
                        warn!("Job queue closed before a queued job was handed over");
                    }
                });
            }
            Err(TrySendError::Closed(id)) => {
                self.registry.finish(&id, Err(JobError::QueueClosed), Utc::now());
                self.cancels().remove(&id);
                return Err(JobError::QueueClosed);
            }
        }
        debug!("Enqueued job {} ({})", job.id, job.name);
        Ok(job)
    }

    /// Cancels a job. Queued jobs fail at once; running jobs stop at their
    /// next checkpoint. Finished jobs are returned unchanged.
    pub fn cancel(&self, id: &str) -> Result<Job, JobError> {
        let job = self.registry.get(id)?;
        if job.state.is_terminal() {
            return Ok(job);
        }
        if let Some(token) = self.cancels().get(id) {
            token.cancel();
        }
        if self.registry.cancel_queued(id, Utc::now()) {
            info!("Cancelled queued job {} ({})", id, job.name);
            self.cancels().remove(id);
        } else {
            info!("Cancellation requested for running job {} ({})", id, job.name);
        }
        self.registry.get(id)
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        debug!("Job worker {} started", worker_id);
        loop {
            let next = {
                let mut rx = self.rx.lock().await;
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => None,
                    id = rx.recv() => id,
                }
            };
            let Some(id) = next else {
                break;
            };
            self.run_job(&id).await;
        }
        debug!("Job worker {} stopped", worker_id);
    }

    async fn run_job(&self, id: &str) {
        let Some(job) = self.registry.try_start(id, Utc::now()) else {
            debug!("Job {} is no longer queued, skipping", id);
            self.cancels().remove(id);
            return;
        };
        let token = self
            .cancels()
            .entry(job.id.clone())
            .or_default()
            .clone();

        let span = info_span!("job",
            job_id = %job.id,
            name = %job.name,
            trigger = ?job.trigger_kind,
        );
        let outcome = self.run_attempts(&job, token).instrument(span).await;
        match &outcome {
            Ok(_) => info!("Job {} ({}) succeeded", job.id, job.name),
            Err(e) => warn!("Job {} ({}) failed: {}", job.id, job.name, e),
        }
        self.registry.finish(id, outcome, Utc::now());
        self.cancels().remove(id);
    }

    async fn run_attempts(&self, job: &Job, token: CancellationToken) -> Result<Value, JobError> {
        let Some(body) = self.bodies.get(&job.name).cloned() else {
            return Err(JobError::Body(format!("no body registered for {}", job.name)));
        };
        let (timeout, max_attempts, backoff) = match self.definitions.get(&job.name) {
            Some(def) => (
                def.timeout,
                def.max_attempts(),
                def.retry.map(|r| r.backoff).unwrap_or_default(),
            ),
            None => (self.job_timeout, 1, Duration::ZERO),
        };

        let mut attempt = 1;
        loop {
            self.registry.record_attempt(&job.id, attempt);
            let ctx = JobContext::new(job.clone(), token.clone(), self.external_call_timeout);
            let err = match run_attempt(body.as_ref(), &ctx, timeout).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if token.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            if attempt >= max_attempts {
                return Err(err);
            }
            warn!(
                "Job {} attempt {}/{} failed: {}, retrying in {:?}",
                job.id, attempt, max_attempts, err, backoff
            );
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = token.cancelled() => return Err(JobError::Cancelled),
            }
            attempt += 1;
        }
    }
}

async fn run_attempt(
    body: &dyn JobBody,
    ctx: &JobContext,
    timeout: Duration,
) -> Result<Value, JobError> {
    let call = AssertUnwindSafe(body.run(ctx)).catch_unwind();
    match tokio::time::timeout(timeout, call).await {
        Err(_) => Err(JobError::Timeout(timeout)),
        Ok(Err(panic)) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(JobError::Body(format!("job body panicked: {}", message)))
        }
        Ok(Ok(result)) => result,
    }
}
