//! In-memory notification channel for tests/dev.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::channel::{Delivery, NotificationChannel, NotificationError};
use crate::message::JobQueueMessage;

/// In-memory notification channel.
///
/// Keeps a log of every accepted delivery (`sent`) and can be told to
/// reject sends, for exercising notify-after-mutate paths.
#[derive(Debug, Default)]
pub struct InMemoryNotificationChannel {
    sent: Mutex<Vec<Delivery>>,
    fail_next: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryNotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` sends.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Reject every send until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of accepted deliveries, in send order.
    pub fn sent(&self) -> Vec<Delivery> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Accepted deliveries for one destination, in send order.
    pub fn sent_to(&self, destination: &str) -> Vec<JobQueueMessage> {
        self.sent()
            .into_iter()
            .filter(|d| d.destination == destination)
            .map(|d| d.message)
            .collect()
    }

    fn should_reject(&self) -> bool {
        if self.unavailable.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl NotificationChannel for InMemoryNotificationChannel {
    async fn send(
        &self,
        message: JobQueueMessage,
        destination: &str,
    ) -> Result<(), NotificationError> {
        if self.should_reject() {
            return Err(NotificationError::Rejected {
                destination: destination.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let delivery = Delivery {
            destination: destination.to_string(),
            message,
        };

        let poisoned = || NotificationError::Rejected {
            destination: destination.to_string(),
            reason: "lock poisoned".to_string(),
        };

        let mut sent = self.sent.lock().map_err(|_| poisoned())?;
        debug!(
            destination = %delivery.destination,
            job_id = %delivery.message.job_id,
            status = %delivery.message.status,
            "notification sent"
        );
        sent.push(delivery);
        Ok(())
    }
}
