use thiserror::Error;

use docsworker_events::NotificationError;

use crate::store::StoreError;

/// Job queue operation error.
///
/// Store failures pass through unchanged; the engine only adds its own
/// interpretation (duplicate, missing, malformed). A `Notification` error
/// means the store mutation already succeeded and stays in place.
#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("an active job with the same payload exists already: {0}")]
    JobExistsAlready(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("notification failed after the store update: {0}")]
    Notification(#[from] NotificationError),
}

impl JobQueueError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, JobQueueError::Store(e) if e.is_timeout())
    }

    /// Zero-modification and other store-level protocol failures.
    pub fn is_db(&self) -> bool {
        matches!(self, JobQueueError::Store(StoreError::Db(_)))
    }
}
