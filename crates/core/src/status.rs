//! Job lifecycle status.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Status of a job document.
///
/// `InQueue` is initial; `Completed` and `Failed` are terminal and only left
/// through an explicit reset.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// Statuses in which a job counts as active for duplicate suppression.
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::InQueue, JobStatus::InProgress];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::InQueue => "inQueue",
            JobStatus::InProgress => "inProgress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inQueue" => Ok(JobStatus::InQueue),
            "inProgress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_wire_names() {
        assert_eq!(serde_json::to_value(JobStatus::InQueue).unwrap(), "inQueue");
        assert_eq!(serde_json::to_value(JobStatus::InProgress).unwrap(), "inProgress");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn parses_known_statuses_only() {
        assert_eq!("completed".parse::<JobStatus>().unwrap(), JobStatus::Completed);
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_and_active_are_disjoint() {
        for s in [
            JobStatus::InQueue,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_ne!(s.is_terminal(), s.is_active());
        }
    }
}
