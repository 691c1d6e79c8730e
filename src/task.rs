//! Ingestion task: fetch an uploaded document, gate it, extract text, and
//! hand off to the generation pipeline.
//!
//! The task is the retryable front half of the system. Everything up to and
//! including extraction runs inside the task's own time budgets; the
//! generation pipeline is spawned as an independent unit of work so a slow
//! generation run cannot hold the ingestion slot.
//!
//! Only transient storage errors are retried. Permanent failures (size
//! gate, page gate, malformed documents) fail the task immediately, since
//! repeating them can never change the outcome.

use crate::config::PipelineConfig;
use crate::error::{DeadlineKind, QuizError};
use crate::pipeline::run_pipeline;
use crate::quiz::PipelineReport;
use crate::Collaborators;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{error, info, warn};

/// Lifecycle of an ingestion task, reported to callers for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Accepted but not yet started.
    Pending,
    /// Downloading the source document from storage.
    Fetching,
    /// Rejected by the size or page gate.
    Gated,
    /// Extracting per-page text.
    Extracting,
    /// Extraction succeeded; the generation pipeline has been spawned.
    Scheduled,
    /// Terminal failure; see `last_error`.
    Failed,
}

/// Outcome summary of one ingestion task run.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub state: TaskState,
    /// Furthest lifecycle stage the task reached before terminating. Equal
    /// to `state` on success; on a gate or failure it names the stage that
    /// was in progress.
    pub stage: TaskState,
    /// Transient fetch attempts that were retried.
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl TaskReport {
    fn failed(stage: TaskState, retry_count: u32, err: &QuizError) -> Self {
        TaskReport {
            state: TaskState::Failed,
            stage,
            retry_count,
            last_error: Some(err.to_string()),
        }
    }

    fn gated(stage: TaskState, retry_count: u32, err: &QuizError) -> Self {
        TaskReport {
            state: TaskState::Gated,
            stage,
            retry_count,
            last_error: Some(err.to_string()),
        }
    }
}

enum Fetched {
    Bytes(Vec<u8>),
    Gated(QuizError),
}

/// Ingestion task runner.
///
/// Holds the capability set and configuration; each [`run`](Self::run) call
/// processes one stored document end to end.
pub struct IngestionTask {
    deps: Collaborators,
    config: PipelineConfig,
}

impl IngestionTask {
    pub fn new(deps: Collaborators, config: PipelineConfig) -> Self {
        IngestionTask { deps, config }
    }

    /// Process the document stored under `key` and notify `email` when the
    /// quiz is ready.
    ///
    /// The whole run is bounded by the hard time budget; the soft budget is
    /// checked between stages so a run that is already over it fails at the
    /// next stage boundary instead of starting more work.
    pub async fn run(&self, key: &str, email: &str) -> TaskReport {
        // The inner run publishes its stage so an abort at the hard budget
        // still reports how far the task got.
        let (stage_tx, stage_rx) = watch::channel(TaskState::Pending);
        let hard = Duration::from_secs(self.config.hard_time_limit_secs);
        match timeout(hard, self.run_inner(key, email, &stage_tx)).await {
            Ok(report) => report,
            Err(_) => {
                let err = QuizError::DeadlineExceeded {
                    kind: DeadlineKind::Hard,
                    secs: self.config.hard_time_limit_secs,
                };
                error!("Task for '{}' aborted: {}", key, err);
                TaskReport::failed(*stage_rx.borrow(), 0, &err)
            }
        }
    }

    async fn run_inner(
        &self,
        key: &str,
        email: &str,
        stage: &watch::Sender<TaskState>,
    ) -> TaskReport {
        let started = Instant::now();
        let mut retry_count: u32 = 0;

        info!("Ingestion task started for '{}'", key);

        stage.send_replace(TaskState::Fetching);

        // Exponential backoff on transient storage errors.
        let bytes = loop {
            match self.fetch(key).await {
                Ok(Fetched::Bytes(bytes)) => break bytes,
                Ok(Fetched::Gated(err)) => {
                    warn!("Document '{}' rejected: {}", key, err);
                    return TaskReport::gated(TaskState::Fetching, retry_count, &err);
                }
                Err(err) if err.is_transient() && retry_count < self.config.fetch_retries => {
                    let delay = Duration::from_secs(1u64 << retry_count);
                    warn!(
                        "Transient fetch failure for '{}' (attempt {}): {}; retrying in {:?}",
                        key,
                        retry_count + 1,
                        err,
                        delay
                    );
                    sleep(delay).await;
                    retry_count += 1;
                }
                Err(err) if err.is_transient() => {
                    let exhausted = QuizError::RetriesExhausted {
                        key: key.to_string(),
                        retries: self.config.fetch_retries,
                        detail: err.to_string(),
                    };
                    error!("{}", exhausted);
                    return TaskReport::failed(TaskState::Fetching, retry_count, &exhausted);
                }
                Err(err) => {
                    error!("Fetch of '{}' failed permanently: {}", key, err);
                    return TaskReport::failed(TaskState::Fetching, retry_count, &err);
                }
            }
            if let Some(report) =
                self.soft_budget_report(started, TaskState::Fetching, retry_count, key)
            {
                return report;
            }
        };

        if let Some(report) =
            self.soft_budget_report(started, TaskState::Fetching, retry_count, key)
        {
            return report;
        }

        stage.send_replace(TaskState::Extracting);

        let pages = match self.extract_bytes(&bytes).await {
            Ok(pages) => pages,
            Err(err) => {
                error!("Extraction for '{}' failed: {}", key, err);
                return TaskReport::failed(TaskState::Extracting, retry_count, &err);
            }
        };

        if pages.len() > self.config.max_pages {
            let err = QuizError::TooManyPages {
                pages: pages.len(),
                limit: self.config.max_pages,
            };
            warn!("Document '{}' rejected: {}", key, err);
            return TaskReport::gated(TaskState::Extracting, retry_count, &err);
        }

        if let Some(report) =
            self.soft_budget_report(started, TaskState::Extracting, retry_count, key)
        {
            return report;
        }

        // Scheduled: the pipeline runs as its own unit of work.
        let deps = self.deps.clone();
        let config = self.config.clone();
        let email = email.to_string();
        let spawned_key = key.to_string();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            match run_pipeline(pages, email, deps, config, cancel_rx).await {
                Ok(report) => info!(
                    "Pipeline for '{}' finished: {} question(s), {}/{} batch(es) failed",
                    spawned_key, report.questions, report.failed_batches, report.total_batches
                ),
                Err(err) => error!("Pipeline for '{}' failed: {}", spawned_key, err),
            }
        });

        info!(
            "Ingestion task for '{}' scheduled generation after {} retry/retries",
            key, retry_count
        );
        stage.send_replace(TaskState::Scheduled);
        TaskReport {
            state: TaskState::Scheduled,
            stage: TaskState::Scheduled,
            retry_count,
            last_error: None,
        }
    }

    /// Size-gate then download. A document over the upload limit is never
    /// downloaded.
    async fn fetch(&self, key: &str) -> Result<Fetched, QuizError> {
        let size = self.deps.store.head_object(key).await?;
        let size_mb = size as f64 / (1024.0 * 1024.0);
        if size_mb > self.config.max_upload_mb as f64 {
            return Ok(Fetched::Gated(QuizError::SizeLimitExceeded {
                size_mb,
                limit_mb: self.config.max_upload_mb,
            }));
        }
        let bytes = self.deps.store.get_object(key).await?;
        Ok(Fetched::Bytes(bytes))
    }

    async fn extract_bytes(&self, bytes: &[u8]) -> Result<Vec<String>, QuizError> {
        let mut tmp = tempfile::Builder::new()
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| QuizError::Internal(format!("Failed to create temp file: {}", e)))?;
        tmp.write_all(bytes)
            .map_err(|e| QuizError::Internal(format!("Failed to write temp file: {}", e)))?;
        tmp.flush()
            .map_err(|e| QuizError::Internal(format!("Failed to flush temp file: {}", e)))?;
        let result = self.deps.extractor.extract(tmp.path()).await?;
        Ok(result.into_pages())
    }

    /// Run the whole flow for a local file, awaiting the pipeline instead
    /// of spawning it. Used by the command line entry point.
    pub async fn run_local(&self, pdf: &Path, email: &str) -> Result<PipelineReport, QuizError> {
        let result = self.deps.extractor.extract(pdf).await?;
        let pages = result.into_pages();
        if pages.len() > self.config.max_pages {
            return Err(QuizError::TooManyPages {
                pages: pages.len(),
                limit: self.config.max_pages,
            });
        }
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        run_pipeline(
            pages,
            email.to_string(),
            self.deps.clone(),
            self.config.clone(),
            cancel_rx,
        )
        .await
    }

    fn soft_budget_report(
        &self,
        started: Instant,
        stage: TaskState,
        retry_count: u32,
        key: &str,
    ) -> Option<TaskReport> {
        let soft = Duration::from_secs(self.config.soft_time_limit_secs);
        if started.elapsed() > soft {
            let err = QuizError::DeadlineExceeded {
                kind: DeadlineKind::Soft,
                secs: self.config.soft_time_limit_secs,
            };
            warn!("Task for '{}' over soft budget: {}", key, err);
            return Some(TaskReport::failed(stage, retry_count, &err));
        }
        None
    }
}
