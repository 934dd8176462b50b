//! `docsworker-core`: domain primitives shared by the job queue crates.
//!
//! This crate contains **pure domain** types (no store or transport concerns).

pub mod error;
pub mod id;
pub mod status;

pub use error::DomainError;
pub use id::JobId;
pub use status::JobStatus;
