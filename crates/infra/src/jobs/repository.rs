//! Job queue engine over the store access layer.
//!
//! Ordering rule for every operation: the store mutation happens first, and
//! the notification is sent only once the mutation is confirmed. A failed
//! notification is returned to the caller as
//! [`JobQueueError::Notification`]; the stored state is never reverted.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use docsworker_core::{JobId, JobStatus};
use docsworker_events::{JobQueueMessage, NotificationChannel};

use crate::config::ConfigSource;
use crate::store::{
    Document, DocumentCollection, FindOneAndUpdateOptions, ReturnDocument, SortDirection,
    StoreAccess,
};

use super::error::JobQueueError;
use super::types::{Job, QueuedJob, timestamp};

const COMPONENT: &str = "JobRepository";

fn obj(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn by_id(id: &JobId) -> Document {
    obj(json!({ "_id": id.to_value() }))
}

/// Claim order: highest priority first, oldest first within a priority.
fn claim_options() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::default()
        .sort_by("priority", SortDirection::Descending)
        .sort_by("createdTime", SortDirection::Ascending)
        .returning(ReturnDocument::Before)
}

/// Persistence and state transitions for documentation build jobs.
///
/// Safe to share between any number of tasks or processes: the only
/// coordination point is the store's per-document atomicity.
pub struct JobRepository<C, N> {
    store: StoreAccess<C>,
    notifier: N,
    config: Arc<dyn ConfigSource>,
}

impl<C, N> std::fmt::Debug for JobRepository<C, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRepository")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<C, N> JobRepository<C, N>
where
    C: DocumentCollection,
    N: NotificationChannel,
{
    pub fn new(collection: C, notifier: N, config: Arc<dyn ConfigSource>) -> Self {
        Self {
            store: StoreAccess::new(collection, config.clone(), COMPONENT),
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &StoreAccess<C> {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Announce a job state change on `destination`.
    pub async fn notify(
        &self,
        job_id: &JobId,
        destination: &str,
        status: JobStatus,
        delay_secs: u32,
    ) -> Result<(), JobQueueError> {
        let message = JobQueueMessage::new(job_id.clone(), status).delayed(delay_secs);
        self.notifier.send(message, destination).await?;
        Ok(())
    }

    /// Insert a job unless one with the same payload is still active.
    ///
    /// Sends `inQueue` to the jobs queue once the document is stored.
    #[instrument(skip(self, job), fields(job_type = job.payload.job_type.as_str()), err)]
    pub async fn insert_job(&self, job: &Job) -> Result<JobId, JobQueueError> {
        let mut doc = job
            .to_document()
            .map_err(|e| JobQueueError::InvalidJob(format!("job is not serializable: {e}")))?;
        // The store assigns the id.
        doc.remove("_id");
        let payload = doc.get("payload").cloned().unwrap_or(Value::Null);
        let active: Vec<&str> = JobStatus::ACTIVE.iter().map(JobStatus::as_str).collect();

        let filter = obj(json!({
            "payload": payload,
            "status": { "$in": active },
        }));
        let update = obj(json!({ "$setOnInsert": doc }));

        let inserted = self
            .store
            .upsert(&filter, &update, "Mongo Timeout Error: Timed out while inserting Job")
            .await?;
        let Some(raw_id) = inserted else {
            return Err(JobQueueError::JobExistsAlready("InsertJobFailed".to_string()));
        };
        let job_id = JobId::from_store_value(&raw_id)
            .map_err(|e| JobQueueError::InvalidJob(format!("store returned an unusable id: {e}")))?;

        let destination = self.config.current().jobs_queue_url;
        self.notify(&job_id, &destination, JobStatus::InQueue, 0).await?;

        info!(job_id = %job_id, "job queued");
        Ok(job_id)
    }

    /// Claim the next eligible queued job, or `None` when the queue is empty.
    #[instrument(skip(self), err)]
    pub async fn claim_next(&self) -> Result<Option<QueuedJob>, JobQueueError> {
        let filter = obj(json!({
            "status": JobStatus::InQueue.as_str(),
            "createdTime": { "$lte": timestamp(Utc::now()) },
        }));
        self.claim(filter).await
    }

    /// Claim a specific job if it is still queued.
    #[instrument(skip(self), fields(job_id = %id), err)]
    pub async fn claim_by_id(&self, id: &JobId) -> Result<Option<QueuedJob>, JobQueueError> {
        let filter = obj(json!({
            "_id": id.to_value(),
            "status": JobStatus::InQueue.as_str(),
        }));
        self.claim(filter).await
    }

    async fn claim(&self, filter: Document) -> Result<Option<QueuedJob>, JobQueueError> {
        let update = obj(json!({
            "$set": {
                "startTime": timestamp(Utc::now()),
                "status": JobStatus::InProgress.as_str(),
            }
        }));

        let reply = self
            .store
            .find_one_and_update(
                &filter,
                &update,
                &claim_options(),
                "Mongo Timeout Error: Timed out while retrieving job",
            )
            .await?;

        let Some(reply) = reply else {
            debug!("no eligible job to claim");
            return Ok(None);
        };
        let Some(doc) = reply.value else {
            return Err(JobQueueError::InvalidJob(
                "JobRepository:claim retrieved a reply without a job document".to_string(),
            ));
        };

        let job = reconstruct(doc)?;
        let job_id = job_id_of(&job)?;

        let destination = self.config.current().job_updates_queue_url;
        self.notify(&job_id, &destination, JobStatus::InProgress, 0).await?;

        info!(job_id = %job_id, job_type = job.job_type().as_str(), "job claimed");
        Ok(Some(job))
    }

    /// Read a job by id.
    ///
    /// Like a claim, a successful read announces `inProgress` on the updates
    /// queue.
    #[instrument(skip(self), fields(job_id = %id), err)]
    pub async fn get_by_id(&self, id: &JobId) -> Result<QueuedJob, JobQueueError> {
        let found = self
            .store
            .find_one(&by_id(id), "Mongo Timeout Error: Timed out while find job by id Job")
            .await?;
        let Some(doc) = found else {
            return Err(JobQueueError::JobNotFound(format!("GetJobByID Failed: {id}")));
        };

        let job = reconstruct(doc)?;
        let destination = self.config.current().job_updates_queue_url;
        self.notify(id, &destination, JobStatus::InProgress, 0).await?;
        Ok(job)
    }

    /// Mark a job completed with its result.
    #[instrument(skip(self, result), fields(job_id = %id), err)]
    pub async fn complete_job(&self, id: &JobId, result: Value) -> Result<(), JobQueueError> {
        let update = obj(json!({
            "$set": {
                "status": JobStatus::Completed.as_str(),
                "endTime": timestamp(Utc::now()),
                "result": result,
            }
        }));
        self.store
            .update_one(
                &by_id(id),
                &update,
                &format!("Mongo Timeout Error: Timed out while updating success status for jobId: {id}"),
            )
            .await?;

        let destination = self.config.current().job_updates_queue_url;
        self.notify(id, &destination, JobStatus::Completed, 0).await
    }

    /// Mark a job failed.
    ///
    /// The updates queue receives `inProgress`, not `failed`: consumers are
    /// told to re-read the job rather than told the outcome.
    #[instrument(skip(self), fields(job_id = %id), err)]
    pub async fn fail_job(&self, id: &JobId, reason: &str) -> Result<(), JobQueueError> {
        let now = timestamp(Utc::now());
        let update = obj(json!({
            "$set": {
                "status": JobStatus::Failed.as_str(),
                "endTime": now,
                "error": { "time": now, "reason": reason },
            }
        }));
        self.store
            .update_one(
                &by_id(id),
                &update,
                &format!("Mongo Timeout Error: Timed out while updating failure status for jobId: {id}"),
            )
            .await?;

        let destination = self.config.current().job_updates_queue_url;
        self.notify(id, &destination, JobStatus::InProgress, 0).await
    }

    /// Put a job back into `status`, regardless of its current state.
    ///
    /// Clears `startTime` and `error` and *replaces* `logs` with `note`;
    /// callers that need the previous logs must read them first. Announces
    /// `inProgress` on the jobs queue so the job is picked up again.
    #[instrument(skip(self), fields(job_id = %id), err)]
    pub async fn reset_job(
        &self,
        id: &JobId,
        status: JobStatus,
        note: &str,
    ) -> Result<(), JobQueueError> {
        let update = obj(json!({
            "$set": {
                "status": status.as_str(),
                "startTime": null,
                "error": {},
                "logs": [note],
            }
        }));
        self.store
            .update_one(
                &by_id(id),
                &update,
                &format!("Mongo Timeout Error: Timed out finishing re-enqueueing job for jobId: {id}"),
            )
            .await?;

        let destination = self.config.current().jobs_queue_url;
        self.notify(id, &destination, JobStatus::InProgress, 0).await
    }

    /// Append log lines, in order.
    pub async fn append_logs(&self, id: &JobId, messages: &[String]) -> Result<(), JobQueueError> {
        let update = obj(json!({ "$push": { "logs": { "$each": messages } } }));
        self.store
            .update_one(
                &by_id(id),
                &update,
                &format!("Mongo Timeout Error: Timed out while inserting log statements for jobId: {id}"),
            )
            .await?;
        Ok(())
    }

    /// Append one human-facing notification message.
    pub async fn append_notification(&self, id: &JobId, message: &str) -> Result<(), JobQueueError> {
        let update = obj(json!({ "$push": { "comMessage": message } }));
        self.store
            .update_one(
                &by_id(id),
                &update,
                &format!("Mongo Timeout Error: Timed out while inserting notification messages for jobId: {id}"),
            )
            .await?;
        Ok(())
    }

    /// Append one batch of CDN-purged URLs (kept as a single entry).
    pub async fn append_purged_urls(&self, id: &JobId, urls: &[String]) -> Result<(), JobQueueError> {
        let update = obj(json!({ "$push": { "purgedURLs": urls } }));
        self.store
            .update_one(
                &by_id(id),
                &update,
                &format!("Mongo Timeout Error: Timed out while inserting purged urls for jobId: {id}"),
            )
            .await?;
        Ok(())
    }
}

fn reconstruct(doc: Document) -> Result<QueuedJob, JobQueueError> {
    QueuedJob::from_document(doc)
        .map_err(|e| JobQueueError::InvalidJob(format!("stored job has an unexpected shape: {e}")))
}

fn job_id_of(job: &QueuedJob) -> Result<JobId, JobQueueError> {
    job.id()
        .cloned()
        .ok_or_else(|| JobQueueError::InvalidJob("stored job has no _id".to_string()))
}
