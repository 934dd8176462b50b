//! Job documents and their typed variants.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use docsworker_core::{JobId, JobStatus};

use crate::store::Document;

/// Latest instant a job can be scheduled for; keeps a four-digit year so
/// stored timestamps stay comparable.
fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Stored timestamp form (RFC 3339, UTC).
pub(crate) fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Kind of documentation work a job describes.
///
/// Closed set; each type maps to exactly one job variant (see
/// [`JobType::variant`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    /// Build triggered by a push to a tracked branch.
    GithubPush,
    /// Build and deploy to production.
    ProductionDeploy,
    /// Regression build comparing output against a baseline.
    Regression,
    /// Publish the docs hub property.
    PublishDochub,
    /// Generate a search manifest for a built property.
    ManifestGeneration,
}

/// Shape a job document is reconstructed into.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JobVariant {
    Build,
    Manifest,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::GithubPush => "githubPush",
            JobType::ProductionDeploy => "productionDeploy",
            JobType::Regression => "regression",
            JobType::PublishDochub => "publishDochub",
            JobType::ManifestGeneration => "manifestGeneration",
        }
    }

    pub fn variant(&self) -> JobVariant {
        match self {
            JobType::GithubPush
            | JobType::ProductionDeploy
            | JobType::Regression
            | JobType::PublishDochub => JobVariant::Build,
            JobType::ManifestGeneration => JobVariant::Manifest,
        }
    }
}

/// Description of the work. Two jobs with equal payloads are duplicates
/// while either is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub repo_name: String,
    pub branch_name: String,
    #[serde(default)]
    pub repo_owner: String,
    #[serde(default)]
    pub is_fork: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_xlarge: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_head: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliased: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_alias: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_next_gen: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_in_global_search: Option<bool>,
}

impl JobPayload {
    pub fn new(
        job_type: JobType,
        repo_owner: impl Into<String>,
        repo_name: impl Into<String>,
        branch_name: impl Into<String>,
    ) -> Self {
        Self {
            job_type,
            source: None,
            action: None,
            repo_name: repo_name.into(),
            branch_name: branch_name.into(),
            repo_owner: repo_owner.into(),
            is_fork: false,
            private: false,
            is_xlarge: None,
            url: None,
            new_head: None,
            patch: None,
            url_slug: None,
            aliased: None,
            primary_alias: None,
            stable: None,
            is_next_gen: None,
            manifest_prefix: None,
            include_in_global_search: None,
        }
    }

    pub fn with_new_head(mut self, sha: impl Into<String>) -> Self {
        self.new_head = Some(sha.into());
        self
    }

    pub fn with_patch(mut self, patch: impl Into<String>) -> Self {
        self.patch = Some(patch.into());
        self
    }

    pub fn with_manifest_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.manifest_prefix = Some(prefix.into());
        self
    }
}

/// Failure record written by `fail_job`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorRecord {
    pub time: DateTime<Utc>,
    pub reason: String,
}

/// Reset writes `error: {}`; treat that like an absent record.
fn empty_error_as_none<'de, D>(deserializer: D) -> Result<Option<JobErrorRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// A job document as stored in the queue collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Assigned by the store on insert.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub payload: JobPayload,
    pub status: JobStatus,
    /// Higher claims first.
    #[serde(default)]
    pub priority: i64,
    /// Claims only consider jobs created at or before "now".
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(
        default,
        deserialize_with = "empty_error_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<JobErrorRecord>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub com_message: Vec<String>,
    #[serde(rename = "purgedURLs", default)]
    pub purged_urls: Vec<Vec<String>>,
}

impl Job {
    /// A new queued job, visible to claims immediately.
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: None,
            title: None,
            user: None,
            email: None,
            payload,
            status: JobStatus::InQueue,
            priority: 1,
            created_time: Utc::now(),
            start_time: None,
            end_time: None,
            result: None,
            error: None,
            logs: Vec::new(),
            com_message: Vec::new(),
            purged_urls: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>, email: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.email = Some(email.into());
        self
    }

    /// Hide the job from claims until `at`.
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_time = at;
        self
    }

    /// Hide the job from claims for `delay` from now.
    ///
    /// Delays past the representable range saturate to the far future.
    pub fn delayed(self, delay: Duration) -> Self {
        let at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .map_or_else(far_future, |at| at.min(far_future()));
        self.scheduled_at(at)
    }

    /// Stored document form (without `_id` when none is assigned yet).
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(serde::ser::Error::custom("job did not serialize to a document")),
        }
    }
}

/// Build-pipeline job (push builds, deploys, regression, docs hub).
#[derive(Debug, Clone, PartialEq)]
pub struct BuildJob {
    pub job: Job,
}

impl BuildJob {
    pub fn from_job(job: Job) -> Self {
        Self { job }
    }
}

/// Search-manifest generation job.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestJob {
    pub job: Job,
    /// Prefix under which the manifest is uploaded.
    pub manifest_prefix: Option<String>,
    pub include_in_global_search: bool,
}

impl ManifestJob {
    pub fn from_job(job: Job) -> Self {
        let manifest_prefix = job.payload.manifest_prefix.clone();
        let include_in_global_search = job.payload.include_in_global_search.unwrap_or(false);
        Self {
            job,
            manifest_prefix,
            include_in_global_search,
        }
    }
}

/// A job reconstructed into the variant its `payload.jobType` names.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedJob {
    Build(BuildJob),
    Manifest(ManifestJob),
}

impl QueuedJob {
    /// Reconstruct a typed job from raw stored fields.
    ///
    /// Fails when the document does not have the job shape or names an
    /// unknown `jobType`.
    pub fn from_document(doc: Document) -> Result<Self, serde_json::Error> {
        let job: Job = serde_json::from_value(Value::Object(doc))?;
        Ok(Self::from_job(job))
    }

    pub fn from_job(job: Job) -> Self {
        match job.payload.job_type.variant() {
            JobVariant::Build => QueuedJob::Build(BuildJob::from_job(job)),
            JobVariant::Manifest => QueuedJob::Manifest(ManifestJob::from_job(job)),
        }
    }

    pub fn job(&self) -> &Job {
        match self {
            QueuedJob::Build(b) => &b.job,
            QueuedJob::Manifest(m) => &m.job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            QueuedJob::Build(b) => b.job,
            QueuedJob::Manifest(m) => m.job,
        }
    }

    pub fn id(&self) -> Option<&JobId> {
        self.job().id.as_ref()
    }

    pub fn job_type(&self) -> JobType {
        self.job().payload.job_type
    }
}
