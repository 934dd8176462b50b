//! Queue configuration and the accessor the engine reads it through.
//!
//! The engine never caches configuration: every store call and every
//! notification asks its [`ConfigSource`] for the current values, so a
//! runtime change (e.g. a longer store deadline) applies to the next call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::warn;

/// Environment keys read by [`QueueConfig::from_env`].
pub mod keys {
    pub const STORE_TIMEOUT_SECS: &str = "MONGO_TIMEOUT_S";
    pub const JOBS_QUEUE_URL: &str = "JOBS_QUEUE_URL";
    pub const JOB_UPDATES_QUEUE_URL: &str = "JOB_UPDATES_QUEUE_URL";
    pub const JOB_QUEUE_COLLECTION: &str = "JOB_QUEUE_COLLECTION";
    pub const CDN_PURGE_ALL: &str = "CDN_PURGE_ALL";
    pub const CDN_CREDENTIALS: &str = "CDN_CREDENTIALS";
}

/// CDN settings consumed by the build pipeline.
///
/// Carried on the same configuration surface as the queue settings; the
/// queue engine itself never reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CdnConfig {
    pub purge_all: bool,
    pub credentials: HashMap<String, String>,
}

/// Job queue configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Deadline applied to every document-store call.
    pub store_timeout: Duration,
    /// Destination for new and re-queued jobs.
    pub jobs_queue_url: String,
    /// Destination for status updates of existing jobs.
    pub job_updates_queue_url: String,
    /// Name of the job document collection.
    pub job_queue_collection: String,
    pub cdn: CdnConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(15),
            jobs_queue_url: "jobs".to_string(),
            job_updates_queue_url: "job-updates".to_string(),
            job_queue_collection: "queue".to_string(),
            cdn: CdnConfig::default(),
        }
    }
}

impl QueueConfig {
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_queues(
        mut self,
        jobs_queue_url: impl Into<String>,
        job_updates_queue_url: impl Into<String>,
    ) -> Self {
        self.jobs_queue_url = jobs_queue_url.into();
        self.job_updates_queue_url = job_updates_queue_url.into();
        self
    }

    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.job_queue_collection = name.into();
        self
    }

    /// Load from process environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment, file, test map).
    ///
    /// Malformed values are logged and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(keys::STORE_TIMEOUT_SECS) {
            let parsed = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
            match parsed {
                Some(timeout) => config.store_timeout = timeout,
                _ => warn!(key = keys::STORE_TIMEOUT_SECS, value = %raw, "invalid store timeout; using default"),
            }
        }
        if let Some(url) = lookup(keys::JOBS_QUEUE_URL) {
            config.jobs_queue_url = url;
        }
        if let Some(url) = lookup(keys::JOB_UPDATES_QUEUE_URL) {
            config.job_updates_queue_url = url;
        }
        if let Some(name) = lookup(keys::JOB_QUEUE_COLLECTION) {
            config.job_queue_collection = name;
        }
        if let Some(raw) = lookup(keys::CDN_PURGE_ALL) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.cdn.purge_all = true,
                "0" | "false" | "no" => config.cdn.purge_all = false,
                _ => warn!(key = keys::CDN_PURGE_ALL, value = %raw, "invalid boolean; using default"),
            }
        }
        if let Some(raw) = lookup(keys::CDN_CREDENTIALS) {
            match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(creds) => config.cdn.credentials = creds,
                Err(e) => warn!(key = keys::CDN_CREDENTIALS, error = %e, "invalid credentials map; ignoring"),
            }
        }

        config
    }
}

/// Accessor for the current configuration.
pub trait ConfigSource: Send + Sync {
    fn current(&self) -> QueueConfig;

    fn store_timeout(&self) -> Duration {
        self.current().store_timeout
    }
}

impl ConfigSource for QueueConfig {
    fn current(&self) -> QueueConfig {
        self.clone()
    }
}

impl<S> ConfigSource for Arc<S>
where
    S: ConfigSource + ?Sized,
{
    fn current(&self) -> QueueConfig {
        (**self).current()
    }
}

/// Configuration that can be changed while the engine is running.
#[derive(Debug, Default)]
pub struct RuntimeConfig {
    inner: RwLock<QueueConfig>,
}

impl RuntimeConfig {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    pub fn arc(config: QueueConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Apply a change; callers observe it on their next read.
    pub fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut QueueConfig),
    {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        change(&mut guard);
    }

    pub fn set_store_timeout(&self, timeout: Duration) {
        self.update(|c| c.store_timeout = timeout);
    }
}

impl ConfigSource for RuntimeConfig {
    fn current(&self) -> QueueConfig {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn loads_all_keys() {
        let config = QueueConfig::from_lookup(lookup_from(&[
            (keys::STORE_TIMEOUT_SECS, "2.5"),
            (keys::JOBS_QUEUE_URL, "https://sqs/jobs"),
            (keys::JOB_UPDATES_QUEUE_URL, "https://sqs/updates"),
            (keys::JOB_QUEUE_COLLECTION, "jobs_v2"),
            (keys::CDN_PURGE_ALL, "true"),
            (keys::CDN_CREDENTIALS, r#"{"token":"t","service":"s"}"#),
        ]));

        assert_eq!(config.store_timeout, Duration::from_millis(2500));
        assert_eq!(config.jobs_queue_url, "https://sqs/jobs");
        assert_eq!(config.job_updates_queue_url, "https://sqs/updates");
        assert_eq!(config.job_queue_collection, "jobs_v2");
        assert!(config.cdn.purge_all);
        assert_eq!(config.cdn.credentials.get("token").map(String::as_str), Some("t"));
    }

    #[test]
    fn malformed_values_keep_defaults() {
        let config = QueueConfig::from_lookup(lookup_from(&[
            (keys::STORE_TIMEOUT_SECS, "soon"),
            (keys::CDN_PURGE_ALL, "maybe"),
            (keys::CDN_CREDENTIALS, "not json"),
        ]));
        let defaults = QueueConfig::default();

        assert_eq!(config.store_timeout, defaults.store_timeout);
        assert!(!config.cdn.purge_all);
        assert!(config.cdn.credentials.is_empty());
    }

    #[test]
    fn unrepresentable_timeouts_keep_default() {
        for raw in ["1e30", "inf", "NaN", "-3", "0"] {
            let config = QueueConfig::from_lookup(lookup_from(&[(keys::STORE_TIMEOUT_SECS, raw)]));
            assert_eq!(config.store_timeout, Duration::from_secs(15), "value {raw}");
        }
    }

    #[test]
    fn runtime_changes_are_visible_on_next_read() {
        let config = RuntimeConfig::arc(QueueConfig::default());
        let source: Arc<dyn ConfigSource> = config.clone();

        assert_eq!(source.store_timeout(), Duration::from_secs(15));
        config.set_store_timeout(Duration::from_millis(200));
        assert_eq!(source.store_timeout(), Duration::from_millis(200));
    }
}
