//! Integration tests for the job queue engine.
//!
//! Tests: JobRepository → StoreAccess → InMemoryCollection, with every
//! state change announced on an InMemoryNotificationChannel.
//!
//! Verifies:
//! - A job is claimed by at most one of many concurrent claimers
//! - Claim order is priority first, then age
//! - Duplicate active jobs are suppressed
//! - Store deadlines surface as timeout errors and abandon the operation
//! - Notifications follow confirmed mutations and are never rolled back

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use proptest::prelude::*;
    use serde_json::json;

    use docsworker_core::{JobId, JobStatus};
    use docsworker_events::{InMemoryNotificationChannel, JobQueueMessage};

    use crate::config::{ConfigSource, QueueConfig, RuntimeConfig};
    use crate::jobs::{Job, JobPayload, JobQueueError, JobRepository, JobType, QueuedJob};
    use crate::store::{InMemoryCollection, StoreError};

    type Repo = JobRepository<Arc<InMemoryCollection>, Arc<InMemoryNotificationChannel>>;

    struct Harness {
        repo: Arc<Repo>,
        collection: Arc<InMemoryCollection>,
        channel: Arc<InMemoryNotificationChannel>,
        config: Arc<RuntimeConfig>,
    }

    fn setup() -> Harness {
        docsworker_observability::init_for_tests();

        let collection = InMemoryCollection::arc("queue");
        let channel = Arc::new(InMemoryNotificationChannel::new());
        let config = RuntimeConfig::arc(QueueConfig::default());
        let source: Arc<dyn ConfigSource> = config.clone();
        let repo = Arc::new(JobRepository::new(collection.clone(), channel.clone(), source));

        Harness {
            repo,
            collection,
            channel,
            config,
        }
    }

    fn job(repo_name: &str) -> Job {
        Job::new(JobPayload::new(JobType::GithubPush, "mongodb", repo_name, "master"))
    }

    fn minutes_ago(n: i64) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::minutes(n)
    }

    fn claimed_id(job: Option<QueuedJob>) -> JobId {
        job.and_then(|j| j.id().cloned()).expect("a job was claimed")
    }

    fn stored(h: &Harness, id: &JobId) -> Job {
        let doc = h
            .collection
            .documents()
            .into_iter()
            .find(|d| d.get("_id") == Some(&id.to_value()))
            .expect("job document exists");
        QueuedJob::from_document(doc).unwrap().into_job()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claimers_never_share_a_job() {
        let h = setup();
        let mut inserted = HashSet::new();
        for i in 0..20 {
            inserted.insert(h.repo.insert_job(&job(&format!("repo-{i}"))).await.unwrap());
        }

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let repo = h.repo.clone();
            tasks.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                while let Some(job) = repo.claim_next().await.unwrap() {
                    mine.push(job.id().cloned().unwrap());
                }
                mine
            }));
        }

        let mut claimed = Vec::new();
        for task in tasks {
            claimed.extend(task.await.unwrap());
        }

        let unique: HashSet<JobId> = claimed.iter().cloned().collect();
        assert_eq!(claimed.len(), 20, "every job claimed exactly once");
        assert_eq!(unique, inserted);
    }

    #[tokio::test]
    async fn higher_priority_is_claimed_first() {
        let h = setup();
        let created = minutes_ago(5);
        let low = h.repo.insert_job(&job("low").with_priority(1).scheduled_at(created)).await.unwrap();
        let high = h.repo.insert_job(&job("high").with_priority(5).scheduled_at(created)).await.unwrap();
        let mid = h.repo.insert_job(&job("mid").with_priority(3).scheduled_at(created)).await.unwrap();

        assert_eq!(claimed_id(h.repo.claim_next().await.unwrap()), high);
        assert_eq!(claimed_id(h.repo.claim_next().await.unwrap()), mid);
        assert_eq!(claimed_id(h.repo.claim_next().await.unwrap()), low);
        assert!(h.repo.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn equal_priority_claims_oldest_first() {
        let h = setup();
        let newer = h.repo.insert_job(&job("newer").scheduled_at(minutes_ago(1))).await.unwrap();
        let older = h.repo.insert_job(&job("older").scheduled_at(minutes_ago(10))).await.unwrap();

        assert_eq!(claimed_id(h.repo.claim_next().await.unwrap()), older);
        assert_eq!(claimed_id(h.repo.claim_next().await.unwrap()), newer);
    }

    #[tokio::test]
    async fn scheduled_jobs_are_not_claimed_early() {
        let h = setup();
        h.repo
            .insert_job(&job("later").delayed(Duration::from_secs(3600)))
            .await
            .unwrap();

        assert!(h.repo.claim_next().await.unwrap().is_none());
        assert_eq!(h.collection.len(), 1);
    }

    #[tokio::test]
    async fn active_duplicate_is_rejected_without_notification() {
        let h = setup();
        let first = h.repo.insert_job(&job("docs")).await.unwrap();

        let err = h.repo.insert_job(&job("docs")).await.unwrap_err();
        assert!(matches!(err, JobQueueError::JobExistsAlready(_)));

        // Claimed is still active.
        h.repo.claim_next().await.unwrap();
        let err = h.repo.insert_job(&job("docs")).await.unwrap_err();
        assert!(matches!(err, JobQueueError::JobExistsAlready(_)));

        assert_eq!(h.collection.len(), 1);
        assert_eq!(
            h.channel.sent_to("jobs"),
            vec![JobQueueMessage::new(first, JobStatus::InQueue)]
        );
    }

    #[tokio::test]
    async fn finished_job_can_be_queued_again() {
        let h = setup();
        let first = h.repo.insert_job(&job("docs")).await.unwrap();
        h.repo.claim_next().await.unwrap();
        h.repo.complete_job(&first, json!({"ok": true})).await.unwrap();

        let second = h.repo.insert_job(&job("docs")).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(h.collection.len(), 2);
    }

    #[tokio::test]
    async fn slow_store_times_out_and_abandons_the_insert() {
        let h = setup();
        h.config.set_store_timeout(Duration::from_millis(50));
        h.collection.set_latency(Duration::from_millis(200));

        let err = h.repo.insert_job(&job("docs")).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Mongo Timeout Error: Timed out while inserting Job --> Timed out in 0.05 seconds."
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(h.collection.is_empty());
        assert!(h.channel.sent().is_empty());

        // A longer deadline applies to the very next call.
        h.config.set_store_timeout(Duration::from_secs(5));
        h.repo.insert_job(&job("docs")).await.unwrap();
        assert_eq!(h.collection.len(), 1);
    }

    #[tokio::test]
    async fn timed_out_claim_reports_retrieval_context() {
        let h = setup();
        h.repo.insert_job(&job("docs")).await.unwrap();
        h.config.set_store_timeout(Duration::from_millis(20));
        h.collection.set_latency(Duration::from_millis(100));

        match h.repo.claim_next().await {
            Err(JobQueueError::Store(StoreError::Timeout { context, .. })) => {
                assert_eq!(context, "Mongo Timeout Error: Timed out while retrieving job");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transitions_announce_on_the_right_queues() {
        let h = setup();
        let id = h.repo.insert_job(&job("docs")).await.unwrap();

        let claimed = h.repo.claim_next().await.unwrap().unwrap();
        // The claim returns the document as it was before the claim.
        assert_eq!(claimed.job().status, JobStatus::InQueue);
        let after_claim = stored(&h, &id);
        assert_eq!(after_claim.status, JobStatus::InProgress);
        assert!(after_claim.start_time.is_some());

        h.repo.fail_job(&id, "build exploded").await.unwrap();
        let failed = stored(&h, &id);
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.unwrap().reason, "build exploded");
        assert!(failed.end_time.is_some());

        h.repo.reset_job(&id, JobStatus::InQueue, "retrying").await.unwrap();
        let reset = stored(&h, &id);
        assert_eq!(reset.status, JobStatus::InQueue);
        assert!(reset.start_time.is_none());
        assert!(reset.error.is_none());
        assert_eq!(reset.logs, vec!["retrying".to_string()]);

        assert_eq!(claimed_id(h.repo.claim_by_id(&id).await.unwrap()), id);
        assert!(h.repo.claim_by_id(&id).await.unwrap().is_none());

        h.repo.complete_job(&id, json!({"pages": 12})).await.unwrap();
        let done = stored(&h, &id);
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result, Some(json!({"pages": 12})));

        assert_eq!(
            h.channel.sent_to("jobs"),
            vec![
                JobQueueMessage::new(id.clone(), JobStatus::InQueue),
                JobQueueMessage::new(id.clone(), JobStatus::InProgress),
            ]
        );
        assert_eq!(
            h.channel.sent_to("job-updates"),
            vec![
                JobQueueMessage::new(id.clone(), JobStatus::InProgress),
                JobQueueMessage::new(id.clone(), JobStatus::InProgress),
                JobQueueMessage::new(id.clone(), JobStatus::InProgress),
                JobQueueMessage::new(id, JobStatus::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn update_of_missing_job_is_a_db_error() {
        let h = setup();
        let ghost: JobId = "does-not-exist".parse().unwrap();

        let err = h.repo.complete_job(&ghost, json!(null)).await.unwrap_err();
        assert!(err.is_db());
        assert!(h.channel.sent().is_empty());

        let err = h.repo.append_logs(&ghost, &["x".to_string()]).await.unwrap_err();
        assert!(err.is_db());
    }

    #[tokio::test]
    async fn missing_job_by_id_is_not_found() {
        let h = setup();
        let ghost: JobId = "does-not-exist".parse().unwrap();

        let err = h.repo.get_by_id(&ghost).await.unwrap_err();
        assert!(matches!(err, JobQueueError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn failed_notification_keeps_the_mutation() {
        let h = setup();
        let id = h.repo.insert_job(&job("docs")).await.unwrap();
        h.repo.claim_next().await.unwrap();

        h.channel.fail_next(1);
        let err = h.repo.complete_job(&id, json!({"ok": true})).await.unwrap_err();
        assert!(matches!(err, JobQueueError::Notification(_)));

        assert_eq!(stored(&h, &id).status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn failed_insert_notification_leaves_job_queued() {
        let h = setup();
        h.channel.fail_next(1);

        let err = h.repo.insert_job(&job("docs")).await.unwrap_err();
        assert!(matches!(err, JobQueueError::Notification(_)));
        assert_eq!(h.collection.len(), 1);

        // Still claimable even though nobody was told about it.
        assert!(h.repo.claim_next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn accumulators_append_in_order() {
        let h = setup();
        let id = h.repo.insert_job(&job("docs")).await.unwrap();

        h.repo.append_logs(&id, &["one".to_string(), "two".to_string()]).await.unwrap();
        h.repo.append_logs(&id, &["three".to_string()]).await.unwrap();
        h.repo.append_notification(&id, "build started").await.unwrap();
        h.repo.append_notification(&id, "build finished").await.unwrap();
        h.repo
            .append_purged_urls(&id, &["https://a/x".to_string(), "https://a/y".to_string()])
            .await
            .unwrap();

        let job = stored(&h, &id);
        assert_eq!(job.logs, vec!["one", "two", "three"]);
        assert_eq!(job.com_message, vec!["build started", "build finished"]);
        assert_eq!(
            job.purged_urls,
            vec![vec!["https://a/x".to_string(), "https://a/y".to_string()]]
        );
        // Accumulators are silent.
        assert_eq!(h.channel.sent().len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn claims_follow_priority_then_age(priorities in prop::collection::vec(0i64..5, 1..10)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();

            rt.block_on(async {
                let h = setup();
                let mut expected = Vec::new();
                for (i, priority) in priorities.iter().enumerate() {
                    // Earlier index = older job.
                    let created = minutes_ago(100 - i as i64);
                    let id = h
                        .repo
                        .insert_job(&job(&format!("repo-{i}")).with_priority(*priority).scheduled_at(created))
                        .await
                        .unwrap();
                    expected.push((*priority, i, id));
                }
                expected.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

                let mut claimed = Vec::new();
                while let Some(job) = h.repo.claim_next().await.unwrap() {
                    claimed.push(job.id().cloned().unwrap());
                }

                let expected: Vec<JobId> = expected.into_iter().map(|(_, _, id)| id).collect();
                prop_assert_eq!(claimed, expected);
                Ok(())
            })?;
        }
    }
}
