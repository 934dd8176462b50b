use serde::{Deserialize, Serialize};

use docsworker_core::{JobId, JobStatus};

/// Unit handed to a notification channel when a job changes state.
///
/// Consumers treat it as a hint: the job document in the store is
/// authoritative and must be re-read to learn the real state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQueueMessage {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Seconds before the message becomes visible to consumers.
    #[serde(default)]
    pub delay: u32,
}

impl JobQueueMessage {
    pub fn new(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            delay: 0,
        }
    }

    pub fn delayed(mut self, delay_secs: u32) -> Self {
        self.delay = delay_secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_uses_camel_case() {
        let msg = JobQueueMessage::new("abc".parse().unwrap(), JobStatus::InQueue).delayed(5);
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v, serde_json::json!({"jobId": "abc", "status": "inQueue", "delay": 5}));

        let back: JobQueueMessage =
            serde_json::from_value(serde_json::json!({"jobId": "abc", "status": "failed"})).unwrap();
        assert_eq!(back.delay, 0);
        assert_eq!(back.status, JobStatus::Failed);
    }
}
