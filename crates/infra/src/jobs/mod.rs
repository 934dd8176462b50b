//! Job queue: persistence protocol, state transitions and the worker loop.
//!
//! ## Lifecycle
//!
//! ```text
//! insert ──> inQueue ──claim──> inProgress ──> completed
//!               ^                    └──────> failed
//!               └──────── reset ─────────────────┘
//! ```
//!
//! ## Components
//!
//! - `JobRepository`: insert with duplicate suppression, atomic claim,
//!   transitions and append-only accumulators, each followed by its
//!   notification
//! - `JobWorker`: claim → run handler → complete/fail loop
//! - `QueuedJob`: typed job variants reconstructed from stored documents

pub mod error;
pub mod repository;
pub mod types;
pub mod worker;

pub use error::JobQueueError;
pub use repository::JobRepository;
pub use types::{
    BuildJob, Job, JobErrorRecord, JobPayload, JobType, JobVariant, ManifestJob, QueuedJob,
};
pub use worker::{JobHandler, JobWorker, RunOutcome, WorkerConfig, WorkerHandle, WorkerStats};
