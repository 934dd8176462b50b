//! Notification channel abstraction (mechanics only).
//!
//! The job queue announces state changes to other processes through a
//! channel. Two logical destinations are used: one for new/re-queued jobs and
//! one for status updates of existing jobs. Which physical queue a
//! destination names is a deployment concern.
//!
//! ## Delivery Guarantees
//!
//! - **At-least-once**: a message may arrive more than once; consumers must
//!   be idempotent.
//! - **Store first**: the job document is written before the message is
//!   sent, so a consumer can always find the job it is told about.
//! - **No rollback**: a failed send is surfaced to the caller, but the stored
//!   job state stays as written.

use std::sync::Arc;

use crate::message::JobQueueMessage;

/// Notification delivery error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    /// The channel refused the message (closed, full, poisoned).
    #[error("notification rejected by {destination}: {reason}")]
    Rejected { destination: String, reason: String },
    /// The transport failed while sending.
    #[error("notification transport error: {0}")]
    Transport(String),
    /// The message could not be encoded for the transport.
    #[error("notification serialization failed: {0}")]
    Serialize(String),
}

/// A message together with the destination it was sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub destination: String,
    pub message: JobQueueMessage,
}

/// Outbound channel for job notifications.
///
/// `send` is awaited by the engine, which never retries on its own: a failure
/// is returned to whoever triggered the state change.
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(
        &self,
        message: JobQueueMessage,
        destination: &str,
    ) -> Result<(), NotificationError>;
}

#[async_trait::async_trait]
impl<C> NotificationChannel for Arc<C>
where
    C: NotificationChannel + ?Sized,
{
    async fn send(
        &self,
        message: JobQueueMessage,
        destination: &str,
    ) -> Result<(), NotificationError> {
        (**self).send(message, destination).await
    }
}
