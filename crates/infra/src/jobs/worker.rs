//! Worker loop: claim a job, run the build pipeline on it, record the outcome.
//!
//! The pipeline itself lives behind [`JobHandler`]. Engine failures are
//! logged and counted but never turned into a job failure here; a job left
//! `inProgress` by an engine error is for a supervisor to reset.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use docsworker_core::JobId;
use docsworker_events::NotificationChannel;

use crate::store::DocumentCollection;

use super::error::JobQueueError;
use super::repository::JobRepository;
use super::types::QueuedJob;

/// The work performed once a job is claimed.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    /// Returns the job's result payload, or the reason it failed.
    async fn handle(&self, job: &QueuedJob) -> anyhow::Result<Value>;
}

/// Worker loop configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long to wait after finding the queue empty
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            name: "docs-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub jobs_claimed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub engine_errors: u64,
    pub uptime_secs: u64,
}

/// What a single iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was eligible.
    Idle,
    Completed(JobId),
    Failed(JobId),
}

/// Handle to control a running worker.
///
/// Dropping it without [`WorkerHandle::shutdown`] detaches the worker, which
/// keeps polling at its configured interval.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the current iteration to end.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    /// Get current worker statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Claims jobs from a repository and runs them through a handler.
pub struct JobWorker<C, N, H> {
    repo: Arc<JobRepository<C, N>>,
    handler: H,
}

impl<C, N, H> JobWorker<C, N, H>
where
    C: DocumentCollection + 'static,
    N: NotificationChannel + 'static,
    H: JobHandler + 'static,
{
    pub fn new(repo: Arc<JobRepository<C, N>>, handler: H) -> Self {
        Self { repo, handler }
    }

    /// Claim and process at most one job.
    pub async fn run_once(&self) -> Result<RunOutcome, JobQueueError> {
        let Some(job) = self.repo.claim_next().await? else {
            return Ok(RunOutcome::Idle);
        };
        let job_id = job
            .id()
            .cloned()
            .ok_or_else(|| JobQueueError::InvalidJob("claimed job has no _id".to_string()))?;

        debug!(job_id = %job_id, job_type = job.job_type().as_str(), "running job");

        match self.handler.handle(&job).await {
            Ok(result) => {
                self.repo.complete_job(&job_id, result).await?;
                Ok(RunOutcome::Completed(job_id))
            }
            Err(err) => {
                let reason = format!("{err:#}");
                self.repo.fail_job(&job_id, &reason).await?;
                // The failure is already recorded; losing the log line is tolerable.
                if let Err(log_err) = self
                    .repo
                    .append_logs(&job_id, &[format!("job failed: {reason}")])
                    .await
                {
                    warn!(job_id = %job_id, error = %log_err, "failed to append failure log");
                }
                Ok(RunOutcome::Failed(job_id))
            }
        }
    }

    /// Spawn the worker loop on the current tokio runtime.
    pub fn spawn(self, config: WorkerConfig) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(WorkerStats::default()));

        let join = tokio::spawn(worker_loop(self, config, shutdown_rx, stats.clone()));

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

async fn worker_loop<C, N, H>(
    worker: JobWorker<C, N, H>,
    config: WorkerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    stats: Arc<Mutex<WorkerStats>>,
) where
    C: DocumentCollection + 'static,
    N: NotificationChannel + 'static,
    H: JobHandler + 'static,
{
    info!(worker = %config.name, "job worker started");
    let start_time = Instant::now();
    // Set once the handle is dropped without a shutdown request.
    let mut detached = false;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let outcome = worker.run_once().await;

        let idle = {
            let mut s = stats.lock().unwrap_or_else(|e| e.into_inner());
            s.uptime_secs = start_time.elapsed().as_secs();
            match &outcome {
                Ok(RunOutcome::Idle) => true,
                Ok(RunOutcome::Completed(_)) => {
                    s.jobs_claimed += 1;
                    s.jobs_completed += 1;
                    false
                }
                Ok(RunOutcome::Failed(_)) => {
                    s.jobs_claimed += 1;
                    s.jobs_failed += 1;
                    false
                }
                Err(_) => {
                    s.engine_errors += 1;
                    true
                }
            }
        };

        match outcome {
            Ok(RunOutcome::Completed(id)) => debug!(worker = %config.name, job_id = %id, "job completed"),
            Ok(RunOutcome::Failed(id)) => debug!(worker = %config.name, job_id = %id, "job failed"),
            Ok(RunOutcome::Idle) => {}
            Err(e) => error!(worker = %config.name, error = %e, "job queue operation failed"),
        }

        if idle {
            tokio::select! {
                _ = tokio::time::sleep(config.poll_interval) => {}
                changed = shutdown_rx.changed(), if !detached => {
                    if changed.is_err() {
                        debug!(worker = %config.name, "worker handle dropped; running detached");
                        detached = true;
                        tokio::time::sleep(config.poll_interval).await;
                    }
                }
            }
        }
    }

    info!(worker = %config.name, "job worker stopped");
}
