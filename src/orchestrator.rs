use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::dialogue::{ConversationEngine, GenerationConfig, GenerationOutcome};
use crate::error::{FailureKind, GenerationError};
use crate::jobs::{Job, JobLifecycle, JobStatus, JobStore, JobUpdate, LifecycleError, StoreError};

/// Seconds a processing job may go without an update before it is flagged.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 300;

pub type BackgroundTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Starts detached work. The submitting call never waits on it.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, task: BackgroundTask);
}

/// Spawns onto the ambient tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

impl TaskSpawner for TokioSpawner {
    fn spawn(&self, task: BackgroundTask) {
        tokio::spawn(task);
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode configuration: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Acceptance returned by [`JobOrchestrator::submit`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
    pub status_url: String,
}

/// A stored job plus the advisory staleness flag.
#[derive(Debug, Clone)]
pub struct JobView {
    pub job: Job,
    pub possibly_stuck: bool,
}

/// Anything that can abort a background run.
#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("failed to record job progress: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl RunError {
    fn kind(&self) -> FailureKind {
        match self {
            RunError::Generation(e) => e.kind(),
            RunError::Store(_) | RunError::Lifecycle(_) => FailureKind::System,
        }
    }

    fn is_truncation(&self) -> bool {
        matches!(self, RunError::Generation(e) if e.is_truncation())
    }
}

/// Owns job records from submission to a terminal state.
#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    engine: Arc<ConversationEngine>,
    spawner: Arc<dyn TaskSpawner>,
    /// Whether a process-wide LLM credential is configured.
    has_default_key: bool,
    stale_after: Duration,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        engine: Arc<ConversationEngine>,
        spawner: Arc<dyn TaskSpawner>,
    ) -> Self {
        Self {
            store,
            engine,
            spawner,
            has_default_key: false,
            stale_after: Duration::seconds(DEFAULT_STALE_AFTER_SECS),
        }
    }

    pub fn with_default_key(mut self, has_default_key: bool) -> Self {
        self.has_default_key = has_default_key;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Records a queued job and schedules its generation.
    ///
    /// Returns as soon as the queued record is written; if that write fails
    /// nothing is scheduled.
    pub async fn submit(&self, config: GenerationConfig) -> Result<Submission, OrchestratorError> {
        config.validate().map_err(OrchestratorError::InvalidConfig)?;

        // ModelSettings never serializes its api_key.
        let job = Job::queued(Some(serde_json::to_value(&config)?));
        self.store.put(&job).await?;
        info!(job_id = %job.id, mode = %config.mode, turns = config.turns, "job queued");

        let job_id = job.id.clone();
        let this = self.clone();
        let task_id = job_id.clone();
        self.spawner.spawn(Box::pin(async move {
            this.run_in_background(&task_id, config).await;
        }));

        Ok(Submission {
            status_url: format!("/generate?mode=status&jobId={job_id}"),
            job_id,
            status: job.status,
            message: job.message,
        })
    }

    /// Runs one job to a terminal state. Never returns an error: failures are
    /// written to the job record, or logged when even that write fails.
    pub async fn run_in_background(&self, job_id: &str, config: GenerationConfig) {
        let started = Utc::now();
        let mut lifecycle = JobLifecycle::new();
        if let Err(e) = self.process(job_id, &config, &mut lifecycle).await {
            self.record_failure(job_id, &config, lifecycle, e, started)
                .await;
        }
    }

    async fn process(
        &self,
        job_id: &str,
        config: &GenerationConfig,
        lifecycle: &mut JobLifecycle,
    ) -> Result<(), RunError> {
        self.check_preconditions(config)?;

        let mut next = *lifecycle;
        let update = next.advance(25, "Initializing generation")?;
        self.commit(job_id, lifecycle, next, update).await?;
        info!(job_id, "job processing");

        let update = next.advance(50, "Applying prompt settings")?;
        self.commit(job_id, lifecycle, next, update).await?;

        let outcome = self.engine.generate(config).await?;
        let turn_count = outcome.conversation.len();
        let metadata = serde_json::to_value(&outcome.metadata).map_err(|e| {
            GenerationError::Extraction(format!("failed to encode metadata: {e}"))
        })?;

        let update = next
            .complete(format!("Generated {turn_count} turns"))?
            .conversation(outcome.conversation)
            .metadata(metadata);
        self.commit(job_id, lifecycle, next, update).await?;
        info!(job_id, turns = turn_count, "job completed");
        Ok(())
    }

    /// Model identity and a credential must be known before any work starts.
    pub fn check_preconditions(&self, config: &GenerationConfig) -> Result<(), GenerationError> {
        if config.model_name().is_none() {
            return Err(GenerationError::Config(
                "a model must be specified (model.model)".into(),
            ));
        }
        let has_request_key = config
            .model
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if !has_request_key && !self.has_default_key {
            return Err(GenerationError::Config(
                "no API key provided and no default key configured".into(),
            ));
        }
        Ok(())
    }

    /// Writes `update`; the in-memory lifecycle only advances once the store
    /// has accepted it.
    async fn commit(
        &self,
        job_id: &str,
        lifecycle: &mut JobLifecycle,
        next: JobLifecycle,
        update: JobUpdate,
    ) -> Result<(), StoreError> {
        self.store.update(job_id, update).await?;
        *lifecycle = next;
        Ok(())
    }

    async fn record_failure(
        &self,
        job_id: &str,
        config: &GenerationConfig,
        mut lifecycle: JobLifecycle,
        err: RunError,
        started: chrono::DateTime<Utc>,
    ) {
        let kind = err.kind();
        let truncation = err.is_truncation();
        let message = err.to_string();
        let chain: Vec<String> = anyhow::Error::new(err)
            .chain()
            .map(|cause| cause.to_string())
            .collect();
        warn!(
            job_id,
            %kind,
            status = %lifecycle.status(),
            progress = lifecycle.progress(),
            error = %message,
            "job failed"
        );

        let update = match lifecycle.fail(format!("Generation failed: {message}")) {
            Ok(update) => update,
            Err(e) => {
                error!(job_id, error = %e, "cannot mark job failed");
                return;
            }
        };
        let now = Utc::now();
        let update = update
            .error(message.clone())
            .error_details(json!({
                "kind": kind,
                "chain": chain,
                "truncation": truncation,
            }))
            .metadata(json!({
                "mode": config.mode,
                "model": config.model_name(),
                "failureKind": kind,
                "failedAt": now,
                "durationMs": (now - started).num_milliseconds(),
            }));

        if let Err(store_err) = self.store.update(job_id, update).await {
            // Not retried; the job stays at its last recorded state.
            error!(
                job_id,
                error = %message,
                store_error = %store_err,
                "failed to record job failure"
            );
        }
    }

    pub async fn get_status(&self, job_id: &str) -> Result<JobView, OrchestratorError> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(job_id.to_string()))?;
        let possibly_stuck = job.is_possibly_stuck(Utc::now(), self.stale_after);
        if possibly_stuck {
            warn!(job_id, updated_at = %job.updated_at, "job possibly stuck");
        }
        Ok(JobView {
            job,
            possibly_stuck,
        })
    }

    /// One generation awaited in-line, no job record.
    pub async fn generate_sync(
        &self,
        config: &GenerationConfig,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.engine.generate(config).await
    }
}

/// Snapshot of a failed run, for callers that report errors outside a job.
pub fn error_details(err: &GenerationError) -> Value {
    json!({
        "kind": err.kind(),
        "truncation": err.is_truncation(),
    })
}
