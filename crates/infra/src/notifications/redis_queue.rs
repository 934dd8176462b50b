//! Redis list-backed notification channel (optional).
//!
//! Each destination is a Redis list; consumers pop from its head. Messages
//! with a delay go to `<destination>:delayed`, a sorted set scored by the
//! unix time at which they become visible. Moving due entries onto the list
//! is the consumer side's job.

use chrono::Utc;
use redis::Commands;
use tracing::debug;

use docsworker_events::{JobQueueMessage, NotificationChannel, NotificationError};

/// Sorted-set key holding delayed messages for `destination`.
pub fn delayed_key(destination: &str) -> String {
    format!("{destination}:delayed")
}

/// Redis-backed notification channel for JSON job queue messages.
#[derive(Debug, Clone)]
pub struct RedisNotificationChannel {
    client: redis::Client,
}

impl RedisNotificationChannel {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, NotificationError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    fn push(
        client: &redis::Client,
        destination: &str,
        payload: String,
        delay_secs: u32,
    ) -> Result<(), NotificationError> {
        let mut conn = client
            .get_connection()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        if delay_secs == 0 {
            let _: i64 = conn
                .rpush(destination, payload)
                .map_err(|e| NotificationError::Transport(e.to_string()))?;
        } else {
            let visible_at = Utc::now().timestamp() + i64::from(delay_secs);
            let _: i64 = conn
                .zadd(delayed_key(destination), payload, visible_at)
                .map_err(|e| NotificationError::Transport(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationChannel for RedisNotificationChannel {
    async fn send(
        &self,
        message: JobQueueMessage,
        destination: &str,
    ) -> Result<(), NotificationError> {
        let payload = serde_json::to_string(&message)
            .map_err(|e| NotificationError::Serialize(e.to_string()))?;

        let client = self.client.clone();
        let dest = destination.to_string();
        let delay = message.delay;

        // The sync client blocks; keep it off the async workers.
        tokio::task::spawn_blocking(move || Self::push(&client, &dest, payload, delay))
            .await
            .map_err(|e| NotificationError::Transport(format!("send task failed: {e}")))??;

        debug!(destination, job_id = %message.job_id, delay = message.delay, "notification pushed to redis");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delayed_messages_use_a_sibling_key() {
        assert_eq!(delayed_key("jobs"), "jobs:delayed");
    }

    #[test]
    fn invalid_url_is_a_transport_error() {
        assert!(matches!(
            RedisNotificationChannel::new("not a url"),
            Err(NotificationError::Transport(_))
        ));
    }
}
