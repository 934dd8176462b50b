//! Infrastructure layer: document store access, job queue engine,
//! configuration and notification transports.

pub mod config;
pub mod jobs;
pub mod notifications;
pub mod store;

#[cfg(test)]
mod integration_tests;
